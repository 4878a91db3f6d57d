//! crates/study_assistant_core/src/assistant.rs
//!
//! The study assistant turns document text into a summary and a question set.
//! It owns the prompts and the fallback policy; the actual model calls go through
//! the `TextGenerationService` port.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{AnswerKey, Question};
use crate::ports::{GenerationRequest, PortError, PortResult, TextGenerationService};
use crate::question_parser::parse_questions;

const SUMMARY_SYSTEM: &str = "You are a helpful study assistant that summarizes course material for students. \
Write clear, factual prose. Do not invent facts that are not in the text.";

const SUMMARY_TEMPLATE: &str = r#"Summarize the following text in about {words} words.
Capture the main points and key ideas a student would need to revise it.

TEXT:
---
{text}
---"#;

const QUESTIONS_SYSTEM: &str = "You are a helpful study assistant that writes multiple-choice questions. \
You always follow the requested output format exactly and add nothing else.";

const QUESTIONS_TEMPLATE: &str = r#"Based on the following text, generate {count} multiple-choice questions.
Cover different parts of the text and test different levels of understanding.

TEXT:
---
{text}
---

Format EVERY question exactly like this, with a blank line between questions:
Q1. [Question text]
A) [Option A]
B) [Option B]
C) [Option C]
D) [Option D]
Correct Answer: [A/B/C/D]

Rules:
- Exactly four options per question, all different.
- The "Correct Answer:" line contains only the letter of the correct option.
- Do not add explanations, headings or any other text."#;

/// The summary used when the model could not be reached.
pub const FALLBACK_SUMMARY: &str =
    "Summary generation failed due to API limitations. Please try again later.";

/// The single question used when the model could not be reached.
pub fn fallback_question() -> Question {
    Question::new(
        "Sample question (API limitation)",
        ["Option A", "Option B", "Option C", "Option D"].map(String::from),
        AnswerKey::A,
    )
    .expect("fallback question satisfies the question invariant")
}

/// Tunables for the two model calls.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub question_count: usize,
    pub summary_words: usize,
    pub summary_max_tokens: u32,
    pub questions_max_tokens: u32,
    /// Document text beyond this many characters is not sent to the model.
    pub max_input_chars: usize,
    pub call_timeout: Duration,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            question_count: 5,
            summary_words: 250,
            summary_max_tokens: 400,
            questions_max_tokens: 1500,
            max_input_chars: 12_000,
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// A summary and question set ready to be attached to a session.
#[derive(Debug, Clone)]
pub struct StudyMaterial {
    pub summary: String,
    pub questions: Vec<Question>,
    /// True when at least one part is a placeholder because a model call failed.
    pub degraded: bool,
}

pub struct StudyAssistant {
    summarizer: Arc<dyn TextGenerationService>,
    question_writer: Arc<dyn TextGenerationService>,
    settings: AssistantSettings,
}

impl StudyAssistant {
    pub fn new(
        summarizer: Arc<dyn TextGenerationService>,
        question_writer: Arc<dyn TextGenerationService>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            summarizer,
            question_writer,
            settings,
        }
    }

    pub fn settings(&self) -> &AssistantSettings {
        &self.settings
    }

    pub async fn summarize(&self, text: &str) -> PortResult<String> {
        let prompt = SUMMARY_TEMPLATE
            .replace("{words}", &self.settings.summary_words.to_string())
            .replace("{text}", truncate_chars(text, self.settings.max_input_chars));
        let request = GenerationRequest {
            system: SUMMARY_SYSTEM.to_string(),
            prompt,
            max_tokens: self.settings.summary_max_tokens,
        };

        let summary = self.call(self.summarizer.as_ref(), &request).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(PortError::Unexpected("model returned an empty summary".to_string()));
        }
        Ok(summary.to_string())
    }

    /// Requests questions in the documented layout and parses them. Malformed
    /// blocks are dropped, so the result may be shorter than requested (or empty).
    pub async fn generate_questions(&self, text: &str) -> PortResult<Vec<Question>> {
        let prompt = QUESTIONS_TEMPLATE
            .replace("{count}", &self.settings.question_count.to_string())
            .replace("{text}", truncate_chars(text, self.settings.max_input_chars));
        let request = GenerationRequest {
            system: QUESTIONS_SYSTEM.to_string(),
            prompt,
            max_tokens: self.settings.questions_max_tokens,
        };

        let raw = self.call(self.question_writer.as_ref(), &request).await?;
        let questions = parse_questions(&raw);
        if questions.is_empty() {
            warn!("Model response contained no well-formed questions");
        }
        Ok(questions)
    }

    /// Produces a summary and questions. Never fails: a failed call is replaced by
    /// its placeholder so the caller can always persist a well-formed result.
    pub async fn process(&self, text: &str) -> StudyMaterial {
        let mut degraded = false;

        let summary = match self.summarize(text).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summary generation failed, using placeholder");
                degraded = true;
                FALLBACK_SUMMARY.to_string()
            }
        };

        let questions = match self.generate_questions(text).await {
            Ok(questions) => questions,
            Err(e) => {
                warn!(error = %e, "Question generation failed, using placeholder");
                degraded = true;
                vec![fallback_question()]
            }
        };

        info!(
            questions = questions.len(),
            degraded, "Study material generated"
        );
        StudyMaterial {
            summary,
            questions,
            degraded,
        }
    }

    async fn call(
        &self,
        backend: &dyn TextGenerationService,
        request: &GenerationRequest,
    ) -> PortResult<String> {
        tokio::time::timeout(self.settings.call_timeout, backend.generate(request))
            .await
            .map_err(|_| {
                PortError::Unexpected(format!(
                    "model call timed out after {:?}",
                    self.settings.call_timeout
                ))
            })?
    }
}

/// Cuts `text` to at most `max_chars` characters, on a character boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
