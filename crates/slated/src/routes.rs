//! HTTP routes for slated
//!
//! Every handler answers with the `{ success, data | message }` envelope.
//! Failures are returned as [`AppError`] and rendered by its
//! `IntoResponse` impl.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slate_shared::{
    canvas::stroke_count, ApiResponse, FeedbackResult, GeneratedQuestion, HistoryEntry, HistoryQuery,
    HistoryUpdate, NewHistoryEntry, NewPracticeAttempt, Pagination, PracticeAttempt, QuestionContext,
    UserProfile,
};
use tracing::{error, info};

use crate::auth::{Claims, CodeSent, Registered, Session};
use crate::canvas::{CanvasError, ImagePayload, PHOTO_DEFAULT_MIME};
use crate::error::{ApiResult, AppError};
use crate::middleware::require_auth;
use crate::server::SharedState;

type Envelope<T> = Json<ApiResponse<T>>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

fn ok<T>(data: T) -> Envelope<T> {
    Json(ApiResponse::success(data))
}

fn created<T>(data: T) -> (StatusCode, Envelope<T>) {
    (StatusCode::CREATED, ok(data))
}

/// Non-empty trimmed string field, or the given validation message
fn required(value: Option<&str>, message: &str) -> ApiResult<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::validation(message))
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        format!("{}…", text.chars().take(limit).collect::<String>())
    } else {
        text.to_string()
    }
}

// ============================================================================
// Auth Routes
// ============================================================================

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    should_create_user: bool,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyCodeRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    display_name: Option<String>,
}

pub fn auth_routes() -> Router<SharedState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/otp/send", post(send_code))
        .route("/auth/otp/verify", post(verify_code))
}

async fn login(
    State(state): State<SharedState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<Envelope<Session>> {
    let Json(req) = body?;
    Ok(ok(state.auth.login(&req.email, &req.password).await?))
}

async fn register(
    State(state): State<SharedState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Envelope<Registered>)> {
    let Json(req) = body?;
    Ok(created(state.auth.register(&req.email, &req.password).await?))
}

async fn send_code(
    State(state): State<SharedState>,
    body: Result<Json<SendCodeRequest>, JsonRejection>,
) -> ApiResult<Envelope<CodeSent>> {
    let Json(req) = body?;
    info!(
        "Code requested for {} (create={}, name={})",
        req.email,
        req.should_create_user,
        req.display_name.as_deref().unwrap_or("-")
    );
    Ok(ok(state.auth.send_code(&req.email, req.should_create_user).await?))
}

async fn verify_code(
    State(state): State<SharedState>,
    body: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> ApiResult<Envelope<Session>> {
    let Json(req) = body?;
    let session = state
        .auth
        .verify_code(&req.email, &req.token, req.display_name.as_deref())
        .await?;
    Ok(ok(session))
}

// ============================================================================
// User Routes
// ============================================================================

pub fn user_routes(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/users/me", get(me))
        .route_layer(from_fn_with_state(state, require_auth))
}

async fn me(State(state): State<SharedState>, Extension(claims): Extension<Claims>) -> ApiResult<Envelope<UserProfile>> {
    Ok(ok(state.auth.profile(&claims).await?))
}

// ============================================================================
// Practice Routes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PracticeRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    question: Option<Value>,
    #[serde(default)]
    canvas: Option<Value>,
}

pub fn practice_routes() -> Router<SharedState> {
    Router::new()
        .route("/practice", post(submit_practice))
        .route("/practice/generate-question", post(generate_question))
}

async fn submit_practice(
    State(state): State<SharedState>,
    body: Result<Json<PracticeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Envelope<PracticeAttempt>)> {
    let Json(req) = body?;
    let user = req
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "anonymous".to_string());
    let question = required(req.question.as_ref().and_then(Value::as_str), "Question is required.")?;
    let canvas = req.canvas.unwrap_or_else(|| Value::Object(Default::default()));

    info!(
        "[Practice] Submission | user={} question=\"{}\" strokes={}",
        user,
        truncate(&question, 80),
        stroke_count(&canvas)
    );

    let attempt = state
        .store
        .create_attempt(NewPracticeAttempt {
            user_id: user.clone(),
            question: question.clone(),
            canvas,
            created_at: Utc::now(),
        })
        .await
        .map_err(|e| {
            error!("[Practice] Submission failed | user={} error={}", user, e);
            e
        })?;

    info!("[Practice] Stored | user={} attemptId={}", user, attempt.id);
    Ok(created(attempt))
}

async fn generate_question(
    State(state): State<SharedState>,
    body: Result<Json<QuestionContext>, JsonRejection>,
) -> ApiResult<Envelope<GeneratedQuestion>> {
    let Json(ctx) = body?;
    Ok(ok(state.tutor.generate_question(&ctx).await?))
}

// ============================================================================
// Vision Routes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    image_base64: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

impl ImageRequest {
    fn image(&self) -> Result<&str, CanvasError> {
        self.image_base64
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CanvasError::Missing)
    }
}

#[derive(Debug, Serialize)]
struct ExtractedText {
    text: String,
}

pub fn vision_routes() -> Router<SharedState> {
    Router::new().route("/vision/extract", post(extract_question))
}

async fn extract_question(
    State(state): State<SharedState>,
    body: Result<Json<ImageRequest>, JsonRejection>,
) -> ApiResult<Envelope<ExtractedText>> {
    let Json(req) = body?;
    let image = ImagePayload::decode(req.image()?, req.mime_type.as_deref(), PHOTO_DEFAULT_MIME)?;
    info!("[Vision] Extracting text ({} bytes, {})", image.bytes.len(), image.mime_type);

    let text = state.tutor.extract_question(&image).await?;
    Ok(ok(ExtractedText { text }))
}

// ============================================================================
// AI Routes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    canvas_state: Option<Value>,
}

pub fn ai_routes() -> Router<SharedState> {
    Router::new()
        .route("/ai/hints", post(hint))
        .route("/ai/evaluate", post(evaluate))
        .route("/ai/evaluate-image", post(evaluate_image))
}

/// Validate question and canvas image; no model call on failure
fn canvas_inputs(req: &ImageRequest) -> ApiResult<(String, ImagePayload)> {
    let question = required(req.question.as_deref(), "Question is required.")?;
    let image = ImagePayload::decode_canvas(req.image()?, req.mime_type.as_deref())?;
    Ok((question, image))
}

async fn hint(
    State(state): State<SharedState>,
    body: Result<Json<ImageRequest>, JsonRejection>,
) -> ApiResult<Envelope<FeedbackResult>> {
    let Json(req) = body?;
    let (question, image) = canvas_inputs(&req)?;
    Ok(ok(state.tutor.hint(&question, &image).await?))
}

async fn evaluate_image(
    State(state): State<SharedState>,
    body: Result<Json<ImageRequest>, JsonRejection>,
) -> ApiResult<Envelope<FeedbackResult>> {
    let Json(req) = body?;
    let (question, image) = canvas_inputs(&req)?;
    Ok(ok(state.tutor.evaluate_image(&question, &image).await?))
}

async fn evaluate(
    State(state): State<SharedState>,
    body: Result<Json<EvaluateRequest>, JsonRejection>,
) -> ApiResult<Envelope<FeedbackResult>> {
    let Json(req) = body?;
    let question = required(req.question.as_deref(), "Question is required.")?;
    let canvas = req
        .canvas_state
        .filter(|c| !c.is_null())
        .ok_or_else(|| AppError::validation("Canvas state is required."))?;
    Ok(ok(state.tutor.evaluate_strokes(&question, &canvas).await?))
}

// ============================================================================
// History Routes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveHistoryRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    question_data: Value,
    #[serde(default)]
    canvas_data: Value,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    subject: Option<String>,
}

pub fn history_routes() -> Router<SharedState> {
    Router::new()
        .route("/history", post(save_history).get(list_history))
        .route("/history/:id", get(get_history).put(update_history))
}

async fn save_history(
    State(state): State<SharedState>,
    body: Result<Json<SaveHistoryRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Envelope<HistoryEntry>)> {
    let Json(req) = body?;
    let user_id = required(req.user_id.as_deref(), "User ID is required.")?;

    let entry = state
        .store
        .save_history(NewHistoryEntry {
            user_id,
            question_data: req.question_data,
            canvas_data: req.canvas_data,
            status: req.status,
            subject: req.subject,
        })
        .await?;
    info!("[History] Saved {}", entry.id);
    Ok(created(entry))
}

async fn update_history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<HistoryUpdate>, JsonRejection>,
) -> ApiResult<Envelope<HistoryEntry>> {
    let Json(update) = body?;
    let entry = state.store.update_history(&id, &update).await?;
    info!("[History] Updated {} (status={:?})", entry.id, entry.status);
    Ok(ok(entry))
}

async fn list_history(
    State(state): State<SharedState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Envelope<Vec<HistoryEntry>>> {
    let Query(params) = params?;
    let mut query = HistoryQuery::new(required(params.user_id.as_deref(), "User ID is required.")?);
    if let Some(page) = params.page {
        query.page = page.max(1);
    }
    if let Some(limit) = params.limit {
        query.limit = limit.max(1);
    }
    query.status = params.status;
    query.subject = params.subject;

    let page = state.store.list_history(&query).await?;
    let pagination = Pagination::new(query.page, query.limit, page.total);
    Ok(Json(ApiResponse::paginated(page.entries, pagination)))
}

async fn get_history(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Envelope<HistoryEntry>> {
    Ok(ok(state.store.get_history(&id).await?))
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    model: String,
}

pub fn health_routes() -> Router<SharedState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: slate_shared::VERSION,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model: state.tutor.model_name().to_string(),
    })
}
