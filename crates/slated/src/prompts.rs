//! Prompt templates for each tutor call site.
//!
//! Hint and image evaluation ask for labeled text; stroke evaluation and
//! question generation ask for a JSON object. The parsers in
//! [`crate::parse`] accept exactly these shapes.

use slate_shared::QuestionContext;

pub fn hint(question: &str) -> String {
    format!(
        r#"You are a patient mathematics tutor looking at a student's whiteboard.

QUESTION: {question}

The image shows the student's work so far. Give ONE short hint that moves them
forward without revealing the final answer. If the board is empty, suggest how
to begin.

Answer in exactly this format:
TITLE: <a short encouraging phrase>
HINT: <one or two sentences>
NEXT_STEP: <the single next thing to try>"#
    )
}

pub fn evaluate_image(question: &str) -> String {
    format!(
        r#"You are grading a student's handwritten answer on a whiteboard.

QUESTION: {question}

Read the work in the image and decide whether the final answer is correct.
If nothing is written, the result is BLANK. Be brief.

Answer in exactly this format:
RESULT: <CORRECT or INCORRECT or BLANK>
FEEDBACK: <one or two sentences for the student>"#
    )
}

/// Stroke-only evaluation: the model never sees the symbols
pub fn evaluate_strokes(question: &str, canvas_description: &str) -> String {
    format!(
        r#"You are a mathematics tutor. A student submitted whiteboard work for this question:

QUESTION: {question}

WHITEBOARD SUMMARY: {canvas_description}

You cannot see the actual symbols, only the summary above. Do not guess
specific answers. In two or three sentences acknowledge the effort, comment on
the likely approach, and suggest what to double-check.

Respond with a single JSON object and nothing else:
{{"title": "<short heading>", "explanation": "<your feedback>", "nextSteps": ["<step>", "..."], "isCorrect": false, "isBlank": <true if the board is blank>}}"#
    )
}

pub const EXTRACT_TEXT: &str = "Transcribe the question shown in this image exactly as written, \
including numbers, symbols and answer options. Output only the transcribed text.";

pub fn reformat_extracted(raw: &str) -> String {
    format!(
        r#"Clean up this transcribed question so it reads naturally as plain text.
Keep every number, symbol and option. Put each option on its own line.
Do not add commentary, markdown or HTML.

{raw}"#
    )
}

pub fn generate_question(ctx: &QuestionContext) -> String {
    let subtopic = ctx.effective_subtopic();
    format!(
        r#"Write one practice question for a student.

Class level: {class_level}
Subject: {subject}
Curriculum: {curriculum}
Topic: {topic}
Subtopic: {subtopic}

Pick one type: multiple-choice, short-answer, problem-solving or true-false.
Multiple-choice questions have four options with exactly one correct.
Include a worked explanation of the answer.

Return only a JSON object of this shape:
{{
  "questionText": "...",
  "type": "multiple-choice",
  "options": [{{"id": "a", "text": "...", "isCorrect": false}}],
  "explanation": "...",
  "difficulty": "Medium",
  "topic": "{topic}",
  "subtopic": "{subtopic}"
}}"#,
        class_level = ctx.class_level,
        subject = ctx.subject,
        curriculum = ctx.curriculum,
        topic = ctx.topic,
        subtopic = subtopic,
    )
}
