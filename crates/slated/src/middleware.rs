//! Request middleware: bearer authentication and error detail expansion.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use slate_shared::ApiResponse;
use tracing::debug;

use crate::auth::AuthError;
use crate::error::{AppError, ErrorReport};
use crate::server::SharedState;

/// Token from `Authorization: Bearer <token>`
fn extract_bearer(request: &Request) -> Option<String> {
    let header = request.headers().get("authorization")?.to_str().ok()?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Verify the bearer token and attach its [`crate::auth::Claims`]
pub async fn require_auth(State(state): State<SharedState>, mut request: Request, next: Next) -> Response {
    if request.headers().get("authorization").is_none() {
        return AppError::from(AuthError::MissingHeader).into_response();
    }

    let claims = match extract_bearer(&request).map(|t| state.auth.tokens().verify(&t)) {
        Some(Ok(claims)) => claims,
        _ => return AppError::from(AuthError::InvalidToken).into_response(),
    };

    debug!("Authenticated {}", claims.id);
    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// Outside production, re-render reported errors with their source chain
pub async fn error_details(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if state.config.is_production() {
        return response;
    }

    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };
    let status = response.status();
    (status, Json(ApiResponse::<()>::error(report.message, Some(report.details)))).into_response()
}
