//! Generated practice questions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the client asks a question to be about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionContext {
    #[serde(default)]
    pub class_level: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub curriculum: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub subtopics: Vec<String>,
    #[serde(default)]
    pub subtopic: Option<String>,
}

impl QuestionContext {
    /// Explicit subtopic, else the first listed one, else "General".
    pub fn effective_subtopic(&self) -> String {
        self.subtopic
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.subtopics.first().map(String::as_str))
            .unwrap_or("General")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// A question produced by the model. Ephemeral: generated per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub id: String,
    pub question_text: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub options: Vec<QuestionOption>,
    pub explanation: String,
    pub difficulty: String,
    pub topic: String,
    pub subtopic: String,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_subtopic() {
        let mut ctx = QuestionContext::default();
        assert_eq!(ctx.effective_subtopic(), "General");

        ctx.subtopics = vec!["Quadratics".to_string(), "Linear".to_string()];
        assert_eq!(ctx.effective_subtopic(), "Quadratics");

        ctx.subtopic = Some("Expanding brackets".to_string());
        assert_eq!(ctx.effective_subtopic(), "Expanding brackets");
    }

    #[test]
    fn test_context_accepts_camel_case() {
        let ctx: QuestionContext = serde_json::from_str(
            r#"{"classLevel":"Class 10","subject":"Mathematics","topic":"Algebra"}"#,
        )
        .unwrap();
        assert_eq!(ctx.class_level, "Class 10");
        assert!(ctx.subtopics.is_empty());
    }
}
