//! REST client for the hosted Gemini API.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{GenerateRequest, GenerateResponse, GenerativeModel, ModelError};
use crate::config::GeminiConfig;

/// Harm categories relaxed to BLOCK_NONE on every call
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl GeminiClient {
    /// Build the shared client once at startup.
    ///
    /// The transport timeout sits slightly above the retry wrapper's
    /// per-attempt race so the race is what normally fires.
    pub fn new(config: &GeminiConfig) -> Result<Self, ModelError> {
        let timeout_secs = config.attempt_timeout_secs + 5;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    /// Wire body: one user turn with text then optional inline image
    pub fn request_body(request: &GenerateRequest) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        if let Some(image) = &request.image {
            parts.push(json!({
                "inlineData": { "mimeType": image.mime_type, "data": image.data }
            }));
        }

        let safety: Vec<Value> = HARM_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
            .collect();

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": request.config,
            "safetySettings": safety,
        })
    }
}

/// Pull the provider's error message out of an error body, if any
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ModelError> {
        debug!(
            "POST {} (temperature={}, max_tokens={}, image={})",
            self.endpoint(),
            request.config.temperature,
            request.config.max_output_tokens,
            request.image.is_some()
        );

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.timeout_secs)
                } else {
                    ModelError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ModelError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ModelError::InvalidBody(e.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
