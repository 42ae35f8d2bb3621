//! Rows persisted in the hosted store.
//!
//! Field names follow the table columns (snake_case) because rows are
//! handed back to clients as stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Accept both numeric and textual primary keys.
fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// A whiteboard submission. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeAttempt {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub user_id: String,
    pub question: String,
    #[serde(default)]
    pub canvas: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPracticeAttempt {
    pub user_id: String,
    pub question: String,
    pub canvas: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub question_data: serde_json::Value,
    #[serde(default)]
    pub canvas_data: serde_json::Value,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewHistoryEntry {
    pub user_id: String,
    pub question_data: serde_json::Value,
    pub canvas_data: serde_json::Value,
    pub status: Option<String>,
    pub subject: Option<String>,
}

/// Partial update of a history entry. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub canvas_data: Option<serde_json::Value>,
}

impl HistoryUpdate {
    /// Merge into an entry and refresh `updated_at`.
    pub fn apply_to(&self, entry: &mut HistoryEntry, now: DateTime<Utc>) {
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            entry.status = Some(status.to_string());
        }
        if let Some(canvas) = self.canvas_data.as_ref().filter(|c| !c.is_null()) {
            entry.canvas_data = canvas.clone();
        }
        entry.updated_at = Some(now);
    }

    /// Column map sent to the store: present fields plus `updated_at`.
    pub fn to_columns(&self, now: DateTime<Utc>) -> serde_json::Map<String, serde_json::Value> {
        let mut columns = serde_json::Map::new();
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            columns.insert("status".to_string(), status.into());
        }
        if let Some(canvas) = self.canvas_data.as_ref().filter(|c| !c.is_null()) {
            columns.insert("canvas_data".to_string(), canvas.clone());
        }
        columns.insert("updated_at".to_string(), now.to_rfc3339().into());
        columns
    }
}

pub const DEFAULT_HISTORY_LIMIT: u32 = 30;

/// Filtered, paginated history listing for one owner.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub user_id: String,
    pub page: u32,
    pub limit: u32,
    pub status: Option<String>,
    pub subject: Option<String>,
}

impl HistoryQuery {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            page: 1,
            limit: DEFAULT_HISTORY_LIMIT,
            status: None,
            subject: None,
        }
    }

    /// Zero-based row offset: (page - 1) * limit.
    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.limit as u64
    }

    /// Status filter to apply, lower-cased. `All` means no filter.
    pub fn status_filter(&self) -> Option<String> {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
            .map(str::to_lowercase)
    }

    pub fn subject_filter(&self) -> Option<&str> {
        self.subject.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
}

/// One outstanding OTP per email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCode {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entry() -> HistoryEntry {
        HistoryEntry {
            id: "1".to_string(),
            user_id: "u1".to_string(),
            question_data: json!({ "text": "2+2" }),
            canvas_data: json!({ "strokes": [] }),
            status: Some("in-progress".to_string()),
            subject: Some("Mathematics".to_string()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_numeric_id_is_accepted() {
        let row: HistoryEntry = serde_json::from_value(json!({
            "id": 42,
            "user_id": "u1",
            "created_at": "2025-01-01T10:00:00+00:00"
        }))
        .unwrap();
        assert_eq!(row.id, "42");
        assert!(row.status.is_none());
    }

    #[test]
    fn test_update_merges_present_fields_only() {
        let mut e = entry();
        let now = Utc::now();
        let update = HistoryUpdate {
            status: Some("solved".to_string()),
            canvas_data: None,
        };
        update.apply_to(&mut e, now);
        assert_eq!(e.status.as_deref(), Some("solved"));
        assert_eq!(e.canvas_data, json!({ "strokes": [] }));
        assert_eq!(e.updated_at, Some(now));
    }

    #[test]
    fn test_update_columns_always_refresh_timestamp() {
        let columns = HistoryUpdate::default().to_columns(Utc::now());
        assert_eq!(columns.len(), 1);
        assert!(columns.contains_key("updated_at"));
    }

    #[test]
    fn test_query_offset_and_filters() {
        let mut q = HistoryQuery::new("u1");
        assert_eq!(q.offset(), 0);
        q.page = 3;
        q.limit = 10;
        assert_eq!(q.offset(), 20);

        q.status = Some("All".to_string());
        assert_eq!(q.status_filter(), None);
        q.status = Some("Solved".to_string());
        assert_eq!(q.status_filter().as_deref(), Some("solved"));
    }

    #[test]
    fn test_code_expiry() {
        let now = Utc::now();
        let code = VerificationCode {
            email: "a@b.c".to_string(),
            code: "123456".to_string(),
            expires_at: now + Duration::minutes(10),
            created_at: now,
        };
        assert!(!code.is_expired(now));
        assert!(code.is_expired(now + Duration::minutes(10)));
    }
}
