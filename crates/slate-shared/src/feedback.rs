//! Hint and evaluation results returned to the whiteboard client.

use serde::{Deserialize, Serialize};

/// Grading outcome for a submitted piece of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Correct,
    Incorrect,
    Blank,
}

impl Outcome {
    /// Map a `RESULT:` value. Anything unrecognized counts as incorrect.
    pub fn from_label(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CORRECT" => Outcome::Correct,
            "BLANK" => Outcome::Blank,
            _ => Outcome::Incorrect,
        }
    }

    /// Title shown on the evaluation card.
    pub fn title(&self) -> &'static str {
        match self {
            Outcome::Correct => "Correct",
            Outcome::Incorrect => "Incorrect",
            Outcome::Blank => "Blank",
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Correct)
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Outcome::Blank)
    }
}

/// Evaluation or hint produced for one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResult {
    pub title: String,
    pub explanation: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blank: Option<bool>,
}

impl FeedbackResult {
    /// A hint: no grading flags.
    pub fn hint(title: impl Into<String>, explanation: impl Into<String>, next_steps: Vec<String>) -> Self {
        Self {
            title: title.into(),
            explanation: explanation.into(),
            next_steps,
            is_correct: None,
            is_blank: None,
        }
    }

    /// A graded evaluation. Flags follow the outcome.
    pub fn graded(
        title: impl Into<String>,
        explanation: impl Into<String>,
        next_steps: Vec<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            title: title.into(),
            explanation: explanation.into(),
            next_steps,
            is_correct: Some(outcome.is_correct()),
            is_blank: Some(outcome.is_blank()),
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match (self.is_correct, self.is_blank) {
            (Some(true), _) => Some(Outcome::Correct),
            (_, Some(true)) => Some(Outcome::Blank),
            (Some(false), _) => Some(Outcome::Incorrect),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_label() {
        assert_eq!(Outcome::from_label("CORRECT"), Outcome::Correct);
        assert_eq!(Outcome::from_label(" correct "), Outcome::Correct);
        assert_eq!(Outcome::from_label("Blank"), Outcome::Blank);
        assert_eq!(Outcome::from_label("INCORRECT"), Outcome::Incorrect);
        assert_eq!(Outcome::from_label("maybe"), Outcome::Incorrect);
    }

    #[test]
    fn test_hint_serializes_without_flags() {
        let hint = FeedbackResult::hint("Hint", "Try factoring", vec!["Factor x".to_string()]);
        let json = serde_json::to_value(&hint).unwrap();
        assert_eq!(json["nextSteps"][0], "Factor x");
        assert!(json.get("isCorrect").is_none());
        assert!(json.get("isBlank").is_none());
    }

    #[test]
    fn test_graded_flags_follow_outcome() {
        let result = FeedbackResult::graded("Blank", "Write something", vec![], Outcome::Blank);
        assert_eq!(result.is_correct, Some(false));
        assert_eq!(result.is_blank, Some(true));
        assert_eq!(result.outcome(), Some(Outcome::Blank));
    }
}
