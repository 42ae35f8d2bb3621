//! JSON shapes the whiteboard client depends on

use chrono::{TimeZone, Utc};
use serde_json::json;
use slate_shared::{ApiResponse, FeedbackResult, GeneratedQuestion, Outcome, Pagination, QuestionOption};

#[test]
fn paginated_envelope() {
    let body = serde_json::to_value(ApiResponse::paginated(vec![1, 2], Pagination::new(2, 2, 5))).unwrap();
    assert_eq!(
        body,
        json!({
            "success": true,
            "data": [1, 2],
            "pagination": { "page": 2, "limit": 2, "total": 5, "totalPages": 3 }
        })
    );
}

#[test]
fn feedback_flags_only_when_graded() {
    let hint = serde_json::to_value(FeedbackResult::hint("Hint", "Try factoring.", vec![])).unwrap();
    assert!(hint.get("isCorrect").is_none());
    assert_eq!(hint["nextSteps"], json!([]));

    let graded = serde_json::to_value(FeedbackResult::graded("Blank", "Nothing written.", vec![], Outcome::Blank)).unwrap();
    assert_eq!(graded["isCorrect"], false);
    assert_eq!(graded["isBlank"], true);
}

#[test]
fn generated_question_uses_type_key() {
    let question = GeneratedQuestion {
        id: "gen-1".to_string(),
        question_text: "Expand (x+1)^2".to_string(),
        kind: Some("multiple_choice".to_string()),
        options: vec![QuestionOption {
            id: "a".to_string(),
            text: "x^2+2x+1".to_string(),
            is_correct: true,
        }],
        explanation: "Square the binomial.".to_string(),
        difficulty: "Medium".to_string(),
        topic: "Algebra".to_string(),
        subtopic: "Expanding".to_string(),
        generated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    };

    let value = serde_json::to_value(&question).unwrap();
    assert_eq!(value["type"], "multiple_choice");
    assert_eq!(value["questionText"], "Expand (x+1)^2");
    assert_eq!(value["options"][0]["isCorrect"], true);
    assert!(value.get("kind").is_none());
}
