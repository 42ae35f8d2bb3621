//! Request-level errors and their HTTP rendering.
//!
//! Every layer error converges here. The response body is always the
//! `{ success: false, message }` envelope; for 5xx responses and
//! aggregated upstream failures the source chain travels in an
//! [`ErrorReport`] extension, which
//! [`crate::middleware::error_details`] expands into `details` outside
//! production.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use slate_shared::ApiResponse;
use std::error::Error as _;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::canvas::CanvasError;
use crate::gemini::retry::ErrorClass;
use crate::mailer::MailError;
use crate::store::StoreError;
use crate::tutor::TutorError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Canvas(#[from] CanvasError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Tutor(#[from] TutorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Canvas(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(e) => match e {
                AuthError::MissingHeader | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AuthError::InvalidCredentials
                | AuthError::AccountExists
                | AuthError::Validation(_)
                | AuthError::NoUser
                | AuthError::InvalidCode => StatusCode::BAD_REQUEST,
                AuthError::Store(StoreError::NotFound(_)) => StatusCode::BAD_REQUEST,
                AuthError::Signing(_) | AuthError::Hashing(_) | AuthError::Store(_) | AuthError::Mail(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Tutor(e) => match e {
                TutorError::Upstream(retry) => match retry.class {
                    ErrorClass::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    ErrorClass::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    ErrorClass::Other => StatusCode::BAD_GATEWAY,
                },
                TutorError::Interpret(crate::gemini::interpret::InterpretError::Blocked(_)) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                TutorError::Interpret(_) | TutorError::Parse(_) => StatusCode::BAD_GATEWAY,
                TutorError::NoText => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::Store(StoreError::NotFound(_)) => StatusCode::BAD_REQUEST,
            AppError::Store(_) | AppError::Mail(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message
    pub fn message(&self) -> String {
        match self {
            AppError::Tutor(TutorError::Upstream(retry)) => match retry.class {
                ErrorClass::Timeout => "The AI service timed out. Please try again.".to_string(),
                ErrorClass::RateLimited => "The AI service is busy. Please wait a moment and try again.".to_string(),
                ErrorClass::Other => "The AI service is unavailable right now. Please try again.".to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Whether the response should carry the source chain
    fn reports_chain(&self) -> bool {
        self.status().is_server_error() || matches!(self, AppError::Tutor(TutorError::Upstream(_)))
    }

    /// Display of this error followed by each source, joined with ": "
    pub fn chain(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut source = self.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if parts.last() != Some(&text) {
                parts.push(text);
            }
            source = cause.source();
        }
        parts.join(": ")
    }
}

/// Source chain of a 5xx or upstream error, attached to the response for
/// the details middleware
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub message: String,
    pub details: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();

        if status.is_server_error() {
            error!("{} {}", status.as_u16(), self.chain());
        } else {
            warn!("{} {}", status.as_u16(), message);
        }

        let mut response = (status, Json(ApiResponse::<()>::error(message.clone(), None))).into_response();
        if self.reports_chain() {
            response.extensions_mut().insert(ErrorReport {
                message,
                details: self.chain(),
            });
        }
        response
    }
}

pub type ApiResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::interpret::InterpretError;
    use crate::gemini::retry::RetryError;
    use crate::gemini::ModelError;

    fn upstream(class: ErrorClass) -> AppError {
        AppError::Tutor(TutorError::Upstream(RetryError {
            operation: "hint".to_string(),
            attempts: 3,
            class,
            last: ModelError::Timeout(45),
        }))
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(CanvasError::Blank { bytes: 10 }).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(AuthError::InvalidToken).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::from(AuthError::InvalidCode).status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream(ErrorClass::Timeout).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(upstream(ErrorClass::RateLimited).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(upstream(ErrorClass::Other).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::from(TutorError::Interpret(InterpretError::Blocked("SAFETY".into()))).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(TutorError::Interpret(InterpretError::Empty)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AppError::from(TutorError::NoText).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AppError::from(StoreError::Backend("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(StoreError::NotFound("History item".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_store_message_is_verbatim() {
        let err = AppError::from(StoreError::Backend("relation \"history\" does not exist".into()));
        assert_eq!(err.message(), "relation \"history\" does not exist");
    }

    #[test]
    fn test_upstream_errors_carry_report() {
        let response = upstream(ErrorClass::RateLimited).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert!(report.details.contains("hint failed after 3 attempts"));

        let response = AppError::validation("Question is required.").into_response();
        assert!(response.extensions().get::<ErrorReport>().is_none());
    }

    #[test]
    fn test_chain_includes_sources() {
        let chain = upstream(ErrorClass::Timeout).chain();
        assert!(chain.contains("hint failed after 3 attempts"));
        assert!(chain.ends_with("Request timeout after 45 seconds"));
    }
}
