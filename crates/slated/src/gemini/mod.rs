//! Generative model access.
//!
//! `GenerativeModel` is the seam between the tutor and the hosted model:
//! production uses [`client::GeminiClient`], tests plug in scripted fakes.
//! Every call goes through [`retry::call_with_retry`] and the raw response
//! is normalized by [`interpret::extract_text`].

pub mod client;
pub mod interpret;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::GeminiClient;

/// Finish reason reported when the output token budget ran out
pub const FINISH_MAX_TOKENS: &str = "MAX_TOKENS";

/// Model call errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Gemini API returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

/// Sampling parameters, fixed per call site
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl GenerationConfig {
    pub fn new(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
            top_p: None,
            top_k: None,
        }
    }

    pub fn with_sampling(mut self, top_p: f32, top_k: u32) -> Self {
        self.top_p = Some(top_p);
        self.top_k = Some(top_k);
        self
    }
}

/// Base64 image attached inline to a prompt
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// A fully formed model request: prompt, optional image, parameters
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
    pub config: GenerationConfig,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>, config: GenerationConfig) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            config,
        }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u32>,
    #[serde(default)]
    pub candidates_token_count: Option<u32>,
    #[serde(default)]
    pub thoughts_token_count: Option<u32>,
}

/// Provider response: nested candidate/content/parts plus metadata.
///
/// `text` is not part of the REST payload; proxies that pre-flatten the
/// answer fill it, and the interpreter prefers it when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Single candidate finished normally with the given text
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_parts(&[&text.into()], Some("STOP"))
    }

    pub fn from_parts(parts: &[&str], finish_reason: Option<&str>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: parts
                        .iter()
                        .map(|p| Part {
                            text: Some(p.to_string()),
                        })
                        .collect(),
                }),
                finish_reason: finish_reason.map(str::to_string),
            }],
            ..Default::default()
        }
    }

    pub fn blocked(reason: &str) -> Self {
        Self {
            prompt_feedback: Some(PromptFeedback {
                block_reason: Some(reason.to_string()),
            }),
            ..Default::default()
        }
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
            .filter(|r| !r.is_empty())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first().and_then(|c| c.finish_reason.as_deref())
    }

    /// Concatenated text parts of the first candidate, trimmed
    pub fn first_candidate_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    pub fn thoughts_tokens(&self) -> u32 {
        self.usage_metadata
            .as_ref()
            .and_then(|u| u.thoughts_token_count)
            .unwrap_or(0)
    }
}

/// Anything that can answer a generate request
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ModelError>;

    /// Model identifier, for logs
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_response() {
        let raw = r#"{
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "TITLE: Nice\n" }, { "text": "HINT: go on" }] },
                "finishReason": "STOP",
                "safetyRatings": []
            }],
            "usageMetadata": { "promptTokenCount": 10, "thoughtsTokenCount": 7 }
        }"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.finish_reason(), Some("STOP"));
        assert_eq!(response.first_candidate_text(), "TITLE: Nice\nHINT: go on");
        assert_eq!(response.thoughts_tokens(), 7);
        assert!(response.block_reason().is_none());
    }

    #[test]
    fn test_blocked_response() {
        let raw = r#"{ "promptFeedback": { "blockReason": "SAFETY" } }"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.block_reason(), Some("SAFETY"));
        assert_eq!(response.first_candidate_text(), "");
    }

    #[test]
    fn test_generation_config_wire_names() {
        let json = serde_json::to_value(GenerationConfig::new(0.7, 1024).with_sampling(0.95, 40)).unwrap();
        assert_eq!(json["maxOutputTokens"], 1024);
        assert_eq!(json["topK"], 40);
        let bare = serde_json::to_value(GenerationConfig::new(0.0, 4096)).unwrap();
        assert!(bare.get("topP").is_none());
    }
}
