//! crates/study_assistant_core/src/question_parser.rs
//!
//! Turns a model's free-text question list into validated [`Question`]s.
//!
//! The expected layout, which the question prompt asks for, is:
//!
//! ```text
//! Q1. <question text>
//! A) <option>
//! B) <option>
//! C) <option>
//! D) <option>
//! Correct Answer: <letter>
//! ```
//!
//! Minor drift is tolerated: `1.` / `Question 1:` / `Question:` markers, markdown bold,
//! `A.` or `(A)` option markers, `Answer:` instead of `Correct Answer:`, and answers
//! written as the option text. A block that still does not fit is dropped on its own;
//! the rest of the batch survives.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::domain::{AnswerKey, Question, QuestionError};

static QUESTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*(?:\*\*)?(?:Q(?:uestion)?[ \t]*\d+[ \t]*[.):]|\d+[ \t]*[.)]|Question[ \t]*:)")
        .expect("question marker regex is valid")
});

static OPTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(?([A-Da-d])[ \t]*[).:\]][ \t]*(.*)$").expect("option marker regex is valid")
});

static ANSWER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:correct[ \t]+)?answer[ \t]*[:\-][ \t]*(.*)$")
        .expect("answer line regex is valid")
});

static ANSWER_LETTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(?([A-Da-d])(?:[ \t]*[).:\]]|$)").expect("answer letter regex is valid")
});

/// Why one question block could not be turned into a [`Question`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedQuestion {
    #[error("block has no question text")]
    MissingQuestionText,
    #[error("block has no answer line")]
    MissingAnswer,
    #[error("expected 4 options, found {found}")]
    TooFewOptions { found: usize },
    #[error("answer '{0}' does not match any option")]
    UnresolvableAnswer(String),
    #[error(transparent)]
    Invalid(#[from] QuestionError),
}

/// Parses every question block in `raw`, dropping (and logging) malformed ones.
pub fn parse_questions(raw: &str) -> Vec<Question> {
    let mut questions = Vec::new();
    for (index, block) in QUESTION_MARKER.split(raw).skip(1).enumerate() {
        match parse_question_block(block) {
            Ok(question) => questions.push(question),
            Err(e) => warn!(block = index + 1, error = %e, "Dropping malformed question"),
        }
    }
    questions
}

/// Parses the text that follows one question marker.
pub fn parse_question_block(block: &str) -> Result<Question, MalformedQuestion> {
    let lines: Vec<String> = block
        .lines()
        .map(normalize_line)
        .filter(|l| !l.is_empty())
        .collect();

    let (first, rest) = lines
        .split_first()
        .ok_or(MalformedQuestion::MissingQuestionText)?;
    if ANSWER_LINE.is_match(first) || OPTION_MARKER.is_match(first) {
        return Err(MalformedQuestion::MissingQuestionText);
    }

    // The last answer line wins; anything after it (explanations) is ignored.
    let answer_at = rest
        .iter()
        .rposition(|l| ANSWER_LINE.is_match(l))
        .ok_or(MalformedQuestion::MissingAnswer)?;
    let raw_answer = ANSWER_LINE
        .captures(&rest[answer_at])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    if raw_answer.is_empty() {
        return Err(MalformedQuestion::MissingAnswer);
    }

    // Lines before the first lettered option are a wrapped question.
    let body = &rest[..answer_at];
    let first_option = body
        .iter()
        .position(|l| OPTION_MARKER.is_match(l))
        .unwrap_or(0);
    let mut text = first.clone();
    for continuation in &body[..first_option] {
        text.push(' ');
        text.push_str(continuation);
    }

    let option_lines = &body[first_option..];
    if option_lines.len() < 4 {
        return Err(MalformedQuestion::TooFewOptions {
            found: option_lines.len(),
        });
    }
    let options: [String; 4] = std::array::from_fn(|i| strip_option_marker(&option_lines[i]));

    let answer = resolve_answer(&raw_answer, &options)
        .ok_or_else(|| MalformedQuestion::UnresolvableAnswer(raw_answer.clone()))?;

    Ok(Question::new(text, options, answer)?)
}

fn normalize_line(line: &str) -> String {
    let line = line.replace("**", "");
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);
    line.trim().to_string()
}

fn strip_option_marker(line: &str) -> String {
    OPTION_MARKER
        .captures(line)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| line.trim().to_string())
}

/// Resolves an answer given as a letter (`B`, `b)`, `(B)`, `B) text`) or as the option text.
fn resolve_answer(raw: &str, options: &[String; 4]) -> Option<AnswerKey> {
    let answer = raw.trim().trim_end_matches('.').trim();

    if let Some(i) = options.iter().position(|o| o.eq_ignore_ascii_case(answer)) {
        return AnswerKey::from_index(i);
    }

    ANSWER_LETTER
        .captures(answer)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().chars().next())
        .and_then(AnswerKey::from_letter)
}
