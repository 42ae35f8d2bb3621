//! Turn a raw model response into usable text.

use tracing::warn;

use super::{GenerateResponse, FINISH_MAX_TOKENS};

/// Truncated output shorter than this is replaced by the call-site fallback
pub const MIN_SALVAGE_CHARS: usize = 20;

/// Terminal response problems. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpretError {
    #[error("Content was blocked by safety filters ({0}). Please try rephrasing your question.")]
    Blocked(String),

    #[error("Received empty response from AI service. Please try again.")]
    Empty,
}

/// Extract the answer text from a response.
///
/// A block reason wins over everything. A top-level `text` field is
/// preferred over candidate parts. When the token budget ran out, the
/// partial text is kept unless it is shorter than [`MIN_SALVAGE_CHARS`],
/// in which case `truncation_fallback` is returned instead.
pub fn extract_text(
    response: &GenerateResponse,
    truncation_fallback: &str,
) -> Result<String, InterpretError> {
    if let Some(reason) = response.block_reason() {
        warn!("Response blocked: {}", reason);
        return Err(InterpretError::Blocked(reason.to_string()));
    }

    let direct = response
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let mut text = direct.unwrap_or_else(|| response.first_candidate_text());

    if response.finish_reason() == Some(FINISH_MAX_TOKENS) {
        warn!(
            "Response hit MAX_TOKENS (thoughts tokens: {}), salvaging {} chars",
            response.thoughts_tokens(),
            text.chars().count()
        );
        if text.chars().count() < MIN_SALVAGE_CHARS {
            text = truncation_fallback.to_string();
        }
    }

    if text.is_empty() {
        return Err(InterpretError::Empty);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "RESULT: INCORRECT\nFEEDBACK: too long";

    #[test]
    fn test_plain_text() {
        let r = GenerateResponse::from_text("  TITLE: Hi\nHINT: try  ");
        assert_eq!(extract_text(&r, FALLBACK).unwrap(), "TITLE: Hi\nHINT: try");
    }

    #[test]
    fn test_top_level_text_preferred() {
        let mut r = GenerateResponse::from_text("from parts");
        r.text = Some("from field".to_string());
        assert_eq!(extract_text(&r, FALLBACK).unwrap(), "from field");
    }

    #[test]
    fn test_blocked_is_terminal() {
        let r = GenerateResponse::blocked("SAFETY");
        assert_eq!(extract_text(&r, FALLBACK), Err(InterpretError::Blocked("SAFETY".into())));
    }

    #[test]
    fn test_truncated_long_text_is_salvaged() {
        let partial = "RESULT: CORRECT\nFEEDBACK: The factorisation is right and";
        let r = GenerateResponse::from_parts(&[partial], Some("MAX_TOKENS"));
        assert_eq!(extract_text(&r, FALLBACK).unwrap(), partial);
    }

    #[test]
    fn test_truncated_short_text_uses_fallback() {
        let r = GenerateResponse::from_parts(&["RESULT: COR"], Some("MAX_TOKENS"));
        assert_eq!(extract_text(&r, FALLBACK).unwrap(), FALLBACK);

        let r = GenerateResponse::from_parts(&[], Some("MAX_TOKENS"));
        assert_eq!(extract_text(&r, FALLBACK).unwrap(), FALLBACK);
    }

    #[test]
    fn test_empty() {
        assert_eq!(extract_text(&GenerateResponse::default(), FALLBACK), Err(InterpretError::Empty));
        let r = GenerateResponse::from_parts(&["   "], Some("STOP"));
        assert_eq!(extract_text(&r, FALLBACK), Err(InterpretError::Empty));
    }
}
