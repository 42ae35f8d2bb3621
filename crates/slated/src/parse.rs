//! Pure parsers from model text to structured results.
//!
//! Two output conventions are supported: labeled text (`TITLE:`, `HINT:`,
//! `FEEDBACK:`, `NEXT_STEP:`, `RESULT:`) and JSON embedded anywhere in the
//! text, optionally inside a code fence. Nothing here fails: unparseable
//! input degrades to the raw text as explanation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use slate_shared::{FeedbackResult, GeneratedQuestion, Outcome, QuestionContext, QuestionOption};

/// A label opens a line or follows a `|` separator
static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)(?:^|\|)[ \t]*\**[ \t]*(TITLE|HINT|FEEDBACK|NEXT[_ ]STEPS?|RESULT)\b\**[ \t]*:")
        .expect("label regex")
});

static SNIFF_CORRECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(correct|perfect|right)\b").expect("sniff regex"));

static SNIFF_BLANK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(blank|cannot see)\b").expect("sniff regex"));

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

pub const DEFAULT_HINT_TITLE: &str = "Hint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Label {
    Title,
    Hint,
    Feedback,
    NextStep,
    Result,
}

impl Label {
    fn parse(raw: &str) -> Self {
        let upper = raw.to_ascii_uppercase();
        match upper.as_str() {
            "TITLE" => Label::Title,
            "HINT" => Label::Hint,
            "FEEDBACK" => Label::Feedback,
            "RESULT" => Label::Result,
            _ => Label::NextStep,
        }
    }
}

fn clean_value(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '|')
}

/// First non-empty value of each label. A value runs from its label to
/// the next label or the end of the text.
fn labeled_fields(text: &str) -> HashMap<Label, String> {
    let marks: Vec<(Label, usize, usize)> = LABEL_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some((Label::parse(name.as_str()), whole.start(), whole.end()))
        })
        .collect();

    let mut fields = HashMap::new();
    for (i, (label, _, value_start)) in marks.iter().enumerate() {
        let value_end = marks.get(i + 1).map(|m| m.1).unwrap_or(text.len());
        let value = clean_value(&text[*value_start..value_end]);
        if !value.is_empty() {
            fields.entry(*label).or_insert_with(|| value.to_string());
        }
    }
    fields
}

/// Parse a labeled hint.
///
/// Title defaults to "Hint"; the explanation is the `HINT:` value (or
/// `FEEDBACK:`), else the whole text.
pub fn parse_hint(raw: &str) -> FeedbackResult {
    let mut fields = labeled_fields(raw);
    let title = fields
        .remove(&Label::Title)
        .unwrap_or_else(|| DEFAULT_HINT_TITLE.to_string());
    let explanation = fields
        .remove(&Label::Hint)
        .or_else(|| fields.remove(&Label::Feedback))
        .unwrap_or_else(|| raw.trim().to_string());
    let next_steps = fields.remove(&Label::NextStep).into_iter().collect();

    FeedbackResult::hint(title, explanation, next_steps)
}

/// Keyword guess used when no `RESULT:` label is present
fn sniff_outcome(raw: &str) -> Outcome {
    if SNIFF_CORRECT_RE.is_match(raw) {
        Outcome::Correct
    } else if SNIFF_BLANK_RE.is_match(raw) {
        Outcome::Blank
    } else {
        Outcome::Incorrect
    }
}

/// Parse a labeled evaluation.
///
/// The outcome comes from the first word after `RESULT:`; without one the
/// text is sniffed for keywords. Unless both `RESULT:` and `FEEDBACK:`
/// (or `HINT:`) are present, the whole text is the explanation. Title is
/// the outcome's name unless a `TITLE:` label overrides it.
pub fn parse_evaluation(raw: &str) -> FeedbackResult {
    let mut fields = labeled_fields(raw);

    let result = fields.remove(&Label::Result).and_then(|value| {
        value
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|w| !w.is_empty())
            .map(Outcome::from_label)
    });
    let feedback = fields
        .remove(&Label::Feedback)
        .or_else(|| fields.remove(&Label::Hint));

    let explanation = match (result, feedback) {
        (Some(_), Some(feedback)) => feedback,
        _ => raw.trim().to_string(),
    };
    let outcome = result.unwrap_or_else(|| sniff_outcome(raw));
    let title = fields
        .remove(&Label::Title)
        .unwrap_or_else(|| outcome.title().to_string());
    let next_steps = fields.remove(&Label::NextStep).into_iter().collect();

    FeedbackResult::graded(title, explanation, next_steps, outcome)
}

/// Slice of the first balanced `{...}` in `text`, honoring string
/// literals. Falls back to first `{` through last `}` when unbalanced.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Locate a JSON object in model output: fenced block first, then the
/// first balanced object anywhere.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(open) = text.find("```") {
        let after = &text[open + 3..];
        // skip the info string (`json`, `JSON`, ...)
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        let fenced = body.find("```").map(|end| &body[..end]).unwrap_or(body);
        if let Some(block) = balanced_object(fenced) {
            return Some(block);
        }
    }
    balanced_object(text)
}

/// Parse the embedded JSON object, if any
pub fn parse_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let block = extract_json_block(text)?;
    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn non_empty_str(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Feedback from embedded JSON `{title, explanation, nextSteps, isCorrect, isBlank}`.
///
/// Missing JSON or fields fall back to `generic_title` and the raw text.
pub fn parse_json_feedback(raw: &str, generic_title: &str) -> FeedbackResult {
    let Some(map) = parse_json_object(raw) else {
        return FeedbackResult::hint(generic_title, raw.trim(), Vec::new());
    };

    let next_steps = match map.get("nextSteps") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    FeedbackResult {
        title: non_empty_str(&map, "title").unwrap_or_else(|| generic_title.to_string()),
        explanation: non_empty_str(&map, "explanation").unwrap_or_else(|| raw.trim().to_string()),
        next_steps,
        is_correct: map.get("isCorrect").and_then(Value::as_bool),
        is_blank: map.get("isBlank").and_then(Value::as_bool),
    }
}

/// Option ids when the model leaves them out: a, b, c, ...
fn option_id(index: usize) -> String {
    char::from_u32('a' as u32 + (index % 26) as u32)
        .map(String::from)
        .unwrap_or_else(|| index.to_string())
}

/// Build a question from a parsed JSON object, defaulting missing fields
/// from the request context.
pub fn question_from_json(
    map: &serde_json::Map<String, Value>,
    ctx: &QuestionContext,
    now: DateTime<Utc>,
) -> GeneratedQuestion {
    let options = match map.get("options") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(text) => QuestionOption {
                    id: option_id(i),
                    text: text.clone(),
                    is_correct: false,
                },
                other => QuestionOption {
                    id: other
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| option_id(i)),
                    text: other
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    is_correct: other
                        .get("isCorrect")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                },
            })
            .collect(),
        _ => Vec::new(),
    };

    GeneratedQuestion {
        id: format!("gen-{}", now.timestamp_millis()),
        question_text: non_empty_str(map, "questionText")
            .or_else(|| non_empty_str(map, "question"))
            .unwrap_or_default(),
        kind: non_empty_str(map, "type"),
        options,
        explanation: non_empty_str(map, "explanation").unwrap_or_default(),
        difficulty: non_empty_str(map, "difficulty").unwrap_or_else(|| "Medium".to_string()),
        topic: non_empty_str(map, "topic").unwrap_or_else(|| ctx.topic.clone()),
        subtopic: non_empty_str(map, "subtopic").unwrap_or_else(|| ctx.effective_subtopic()),
        generated_at: now,
    }
}

/// Tidy OCR output: literal `\n` sequences become newlines when the text
/// has none, HTML tags and `**` are dropped.
pub fn clean_extracted_text(text: &str) -> String {
    let text = if text.contains('\n') {
        text.to_string()
    } else {
        text.replace("\\n", "\n")
    };
    HTML_TAG_RE
        .replace_all(&text, "")
        .replace("**", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_labels_any_order() {
        let raw = "NEXT_STEP:   Divide both sides by 2.\n\nTITLE:  Isolate x \nHINT:\n  Move the constant  first. ";
        let hint = parse_hint(raw);
        assert_eq!(hint.title, "Isolate x");
        assert_eq!(hint.explanation, "Move the constant  first.");
        assert_eq!(hint.next_steps, vec!["Divide both sides by 2."]);
        assert_eq!(hint.is_correct, None);
    }

    #[test]
    fn test_hint_without_labels_uses_raw() {
        let raw = "Try looking at the units of each term.";
        let hint = parse_hint(raw);
        assert_eq!(hint.title, "Hint");
        assert_eq!(hint.explanation, raw);
        assert!(hint.next_steps.is_empty());
    }

    #[test]
    fn test_hint_markdown_labels() {
        let hint = parse_hint("**TITLE:** Factor it\n**HINT:** Look for a common factor.");
        assert_eq!(hint.title, "Factor it");
        assert_eq!(hint.explanation, "Look for a common factor.");
    }

    #[test]
    fn test_evaluation_correct() {
        let eval = parse_evaluation("RESULT: CORRECT\nFEEDBACK: Perfect factorisation.");
        assert_eq!(eval.title, "Correct");
        assert_eq!(eval.is_correct, Some(true));
        assert_eq!(eval.is_blank, Some(false));
        assert_eq!(eval.explanation, "Perfect factorisation.");
    }

    #[test]
    fn test_evaluation_single_line() {
        let eval = parse_evaluation("RESULT: BLANK | FEEDBACK: Nothing written yet.");
        assert_eq!(eval.outcome(), Some(Outcome::Blank));
        assert_eq!(eval.explanation, "Nothing written yet.");
    }

    #[test]
    fn test_evaluation_unknown_result_is_incorrect() {
        let eval = parse_evaluation("RESULT: PARTIAL\nFEEDBACK: Half way there.");
        assert_eq!(eval.outcome(), Some(Outcome::Incorrect));
        assert_eq!(eval.title, "Incorrect");
    }

    #[test]
    fn test_evaluation_keyword_fallback() {
        let raw = "That's right, nicely done.";
        let eval = parse_evaluation(raw);
        assert_eq!(eval.outcome(), Some(Outcome::Correct));
        assert_eq!(eval.explanation, raw);

        // "incorrect" must not read as "correct"
        assert_eq!(parse_evaluation("This is incorrect.").outcome(), Some(Outcome::Incorrect));
        assert_eq!(parse_evaluation("I cannot see any work.").outcome(), Some(Outcome::Blank));
    }

    #[test]
    fn test_keyword_fallback_prefers_correct() {
        let eval = parse_evaluation("Your answer is right, although the top of the board is blank.");
        assert_eq!(eval.outcome(), Some(Outcome::Correct));
    }

    #[test]
    fn test_feedback_without_result_uses_raw() {
        let raw = "FEEDBACK: Perfect, the factorisation is right.";
        let eval = parse_evaluation(raw);
        assert_eq!(eval.explanation, raw);
        assert_eq!(eval.outcome(), Some(Outcome::Correct));

        // result without feedback keeps the stated outcome
        let eval = parse_evaluation("RESULT: BLANK");
        assert_eq!(eval.outcome(), Some(Outcome::Blank));
        assert_eq!(eval.explanation, "RESULT: BLANK");
    }

    #[test]
    fn test_labels_inside_prose_are_text() {
        let eval = parse_evaluation("RESULT: INCORRECT\nFEEDBACK: Check your result: 7x8 is 56, not 54.");
        assert_eq!(eval.outcome(), Some(Outcome::Incorrect));
        assert_eq!(eval.explanation, "Check your result: 7x8 is 56, not 54.");

        let hint = parse_hint(
            "TITLE: Almost\nHINT: You isolated x. Your next step: divide both sides by 2.\nNEXT_STEP: Divide by 2",
        );
        assert_eq!(hint.explanation, "You isolated x. Your next step: divide both sides by 2.");
        assert_eq!(hint.next_steps, vec!["Divide by 2"]);
    }

    #[test]
    fn test_fenced_and_bare_json_agree() {
        let bare = r#"{"title":"Good start","explanation":"Check the sign","nextSteps":["Expand"],"isCorrect":false,"isBlank":false}"#;
        let fenced = format!("Here you go:\n```json\n{}\n```\nGood luck!", bare);
        assert_eq!(parse_json_feedback(bare, "AI Feedback"), parse_json_feedback(&fenced, "AI Feedback"));
    }

    #[test]
    fn test_json_with_braces_in_strings() {
        let raw = r#"Sure. {"title":"Sets","explanation":"Write it as {1, 2} \"exactly\"","nextSteps":"none"} trailing }"#;
        let fb = parse_json_feedback(raw, "AI Feedback");
        assert_eq!(fb.title, "Sets");
        assert_eq!(fb.explanation, "Write it as {1, 2} \"exactly\"");
        assert!(fb.next_steps.is_empty());
        assert_eq!(fb.is_correct, None);
    }

    #[test]
    fn test_json_failure_degrades_to_raw() {
        let raw = "I could not produce JSON, sorry.";
        let fb = parse_json_feedback(raw, "AI Feedback");
        assert_eq!(fb.title, "AI Feedback");
        assert_eq!(fb.explanation, raw);
    }

    #[test]
    fn test_question_defaults() {
        let ctx = QuestionContext {
            topic: "Algebra".to_string(),
            subtopics: vec!["Quadratics".to_string()],
            ..Default::default()
        };
        let map = parse_json_object(r#"{"question":"Solve x^2=4","options":[{"text":"2"},{"id":"z","text":"-2","isCorrect":true}]}"#).unwrap();
        let now = Utc::now();
        let q = question_from_json(&map, &ctx, now);

        assert_eq!(q.id, format!("gen-{}", now.timestamp_millis()));
        assert_eq!(q.question_text, "Solve x^2=4");
        assert_eq!(q.difficulty, "Medium");
        assert_eq!(q.topic, "Algebra");
        assert_eq!(q.subtopic, "Quadratics");
        assert_eq!(q.options[0].id, "a");
        assert_eq!(q.options[1].id, "z");
        assert!(q.options[1].is_correct);
    }

    #[test]
    fn test_clean_extracted_text() {
        assert_eq!(clean_extracted_text("Line one\\nLine **two**"), "Line one\nLine two");
        assert_eq!(clean_extracted_text("a\\nb\nc"), "a\\nb\nc");
        assert_eq!(clean_extracted_text("<p>Find x</p><br/>"), "Find x");
    }
}
