//! The `{ success, data | message }` envelope every endpoint answers with.

use serde::{Deserialize, Serialize};

/// Page metadata attached to list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(limit as u64)
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// JSON response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    /// Error detail chain, only outside production.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: None,
            details: None,
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::success(data)
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            pagination: None,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 30, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 30, 30).total_pages, 1);
        assert_eq!(Pagination::new(1, 30, 31).total_pages, 2);
        assert_eq!(Pagination::new(1, 0, 31).total_pages, 0);
    }

    #[test]
    fn test_error_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::error("Question is required.", None)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Question is required.");
        assert!(json.get("data").is_none());
        assert!(json.get("details").is_none());
    }
}
