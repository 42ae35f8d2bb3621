//! Tutor call sites: hints, grading, OCR and question generation.
//!
//! Each call site fixes its own generation parameters, goes through the
//! retry wrapper, then the interpreter, then a pure parser.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use slate_shared::{FeedbackResult, GeneratedQuestion, QuestionContext};
use tracing::{info, warn};

use crate::canvas::{self, ImagePayload};
use crate::gemini::interpret::{self, InterpretError};
use crate::gemini::retry::{call_with_retry, ErrorClass, RetryError, RetryPolicy};
use crate::gemini::{GenerateRequest, GenerationConfig, GenerativeModel};
use crate::parse;
use crate::prompts;

pub const STROKE_FEEDBACK_TITLE: &str = "AI Feedback";

const HINT_TRUNCATED: &str = "TITLE: Keep going!\nHINT: Your work is extensive. Focus on one step at a time and ask again.";
const EVALUATION_TRUNCATED: &str =
    "RESULT: INCORRECT\nFEEDBACK: Your work is extensive. Please break it into smaller steps for better feedback.";
const STROKES_TRUNCATED: &str =
    "Your work is extensive. Please break it into smaller steps for better feedback.";

#[derive(Debug, Clone, thiserror::Error)]
pub enum TutorError {
    #[error(transparent)]
    Upstream(#[from] RetryError),

    #[error(transparent)]
    Interpret(#[from] InterpretError),

    #[error("Could not parse the AI response: {0}")]
    Parse(String),

    #[error("No text detected in the image.")]
    NoText,
}

impl TutorError {
    /// Retry class of the final upstream failure, if this was one
    pub fn upstream_class(&self) -> Option<ErrorClass> {
        match self {
            TutorError::Upstream(e) => Some(e.class),
            _ => None,
        }
    }
}

pub struct Tutor {
    model: Arc<dyn GenerativeModel>,
    policy: RetryPolicy,
}

impl Tutor {
    pub fn new(model: Arc<dyn GenerativeModel>, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Retry, then interpret
    async fn complete(
        &self,
        operation: &str,
        request: GenerateRequest,
        truncation_fallback: &str,
    ) -> Result<String, TutorError> {
        let model = &self.model;
        let request = &request;
        let response = call_with_retry(&self.policy, operation, || model.generate(request)).await?;
        Ok(interpret::extract_text(&response, truncation_fallback)?)
    }

    pub async fn hint(&self, question: &str, image: &ImagePayload) -> Result<FeedbackResult, TutorError> {
        info!("Generating hint ({} bytes, {})", image.bytes.len(), image.mime_type);
        let request = GenerateRequest::text(
            prompts::hint(question),
            GenerationConfig::new(0.7, 1024).with_sampling(0.95, 40),
        )
        .with_image(image.to_inline());

        let text = self.complete("hint", request, HINT_TRUNCATED).await?;
        Ok(parse::parse_hint(&text))
    }

    pub async fn evaluate_image(
        &self,
        question: &str,
        image: &ImagePayload,
    ) -> Result<FeedbackResult, TutorError> {
        info!("Evaluating canvas image ({} bytes, {})", image.bytes.len(), image.mime_type);
        let request = GenerateRequest::text(
            prompts::evaluate_image(question),
            GenerationConfig::new(0.3, 1536).with_sampling(0.95, 40),
        )
        .with_image(image.to_inline());

        let text = self.complete("evaluate-image", request, EVALUATION_TRUNCATED).await?;
        Ok(parse::parse_evaluation(&text))
    }

    /// Grade from a stroke summary only
    pub async fn evaluate_strokes(&self, question: &str, canvas_state: &Value) -> Result<FeedbackResult, TutorError> {
        let description = canvas::describe_canvas(canvas_state);
        let request = GenerateRequest::text(
            prompts::evaluate_strokes(question, &description),
            GenerationConfig::new(0.3, 2048),
        );

        let text = self.complete("evaluate", request, STROKES_TRUNCATED).await?;
        Ok(parse::parse_json_feedback(&text, STROKE_FEEDBACK_TITLE))
    }

    /// Two-step OCR: transcribe, then tidy.
    ///
    /// A failed or empty tidy step falls back to the raw transcription.
    pub async fn extract_question(&self, image: &ImagePayload) -> Result<String, TutorError> {
        let request = GenerateRequest::text(prompts::EXTRACT_TEXT, GenerationConfig::new(0.0, 4096))
            .with_image(image.to_inline());

        let raw = match self.complete("vision-extract", request, "").await {
            Ok(text) => text,
            Err(TutorError::Interpret(InterpretError::Empty)) => return Err(TutorError::NoText),
            Err(e) => return Err(e),
        };

        let request = GenerateRequest::text(prompts::reformat_extracted(&raw), GenerationConfig::new(0.3, 4096));
        let formatted = match self.complete("vision-format", request, "").await {
            Ok(text) => text,
            Err(e) => {
                warn!("Formatting step failed, using raw transcription: {}", e);
                raw
            }
        };

        let cleaned = parse::clean_extracted_text(&formatted);
        if cleaned.is_empty() {
            return Err(TutorError::NoText);
        }
        Ok(cleaned)
    }

    pub async fn generate_question(&self, ctx: &QuestionContext) -> Result<GeneratedQuestion, TutorError> {
        info!("Generating question: {} / {} / {}", ctx.subject, ctx.topic, ctx.effective_subtopic());
        let request = GenerateRequest::text(prompts::generate_question(ctx), GenerationConfig::new(0.7, 4096));

        let text = self.complete("generate-question", request, "").await?;
        let map = parse::parse_json_object(&text)
            .ok_or_else(|| TutorError::Parse("no JSON object in model output".to_string()))?;
        Ok(parse::question_from_json(&map, ctx, Utc::now()))
    }
}
