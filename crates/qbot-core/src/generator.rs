use qbot_llm::{CompletionRequest, LanguageModel};
use tracing::{debug, info};

use crate::validator::{self, Rejection};
use crate::{Conversation, GenerationError, QuestionPrompts, QuestionnaireConfig};

/// Sampling temperature for the first attempt
pub const PRIMARY_TEMPERATURE: f32 = 0.7;

/// Sampling temperature for the stricter retry
pub const RETRY_TEMPERATURE: f32 = 0.3;

/// Token budget for one question
pub const MAX_QUESTION_TOKENS: u32 = 150;

/// Number of validated attempts before falling back
const ATTEMPTS: u32 = 2;

/// A candidate that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCandidate {
    /// 1-based attempt number
    pub attempt: u32,
    pub candidate: String,
    pub reason: Rejection,
}

/// What the generator produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    /// An admissible question
    Question(String),
    /// Both attempts were rejected; carries the closing sentence
    Fallback(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub generated: Generated,
    pub rejected: Vec<RejectedCandidate>,
}

/// Produces the next question by asking the model, validating the reply
/// and retrying once with a stricter instruction.
pub struct QuestionGenerator<'a> {
    model: &'a dyn LanguageModel,
    config: &'a QuestionnaireConfig,
}

impl<'a> QuestionGenerator<'a> {
    pub fn new(model: &'a dyn LanguageModel, config: &'a QuestionnaireConfig) -> Self {
        Self { model, config }
    }

    /// Generate the question that follows `conversation`.
    ///
    /// Validation failures never surface as errors; a model failure on
    /// either attempt is returned as [`GenerationError::Model`].
    pub async fn generate_next_question(
        &self,
        conversation: &Conversation,
    ) -> Result<GenerationOutcome, GenerationError> {
        let prior: Vec<&str> = conversation.questions().collect();
        let mut rejected = Vec::new();

        for attempt in 1..=ATTEMPTS {
            let strict = attempt > 1;
            let temperature = if strict {
                RETRY_TEMPERATURE
            } else {
                PRIMARY_TEMPERATURE
            };
            let request = CompletionRequest::new(QuestionPrompts::build_messages(conversation, strict))
                .with_temperature(temperature)
                .with_max_tokens(MAX_QUESTION_TOKENS);

            debug!(
                attempt,
                temperature,
                model = self.model.name(),
                next_number = prior.len() + 1,
                "Requesting candidate question"
            );
            let completion = self.model.complete(request).await?;
            let candidate = clean_reply(&completion.content);

            let verdict = if completion.was_truncated() && !candidate.is_empty() {
                Err(Rejection::Truncated)
            } else {
                validator::check(&candidate, &prior, self.config.duplicate_threshold)
            };
            match verdict {
                Ok(()) => {
                    return Ok(GenerationOutcome {
                        generated: Generated::Question(candidate),
                        rejected,
                    });
                }
                Err(reason) => {
                    info!(attempt, reason = %reason, "Candidate question rejected");
                    rejected.push(RejectedCandidate {
                        attempt,
                        candidate,
                        reason,
                    });
                }
            }
        }

        Ok(GenerationOutcome {
            generated: Generated::Fallback(self.config.fallback_sentence.clone()),
            rejected,
        })
    }
}

/// Strip surrounding whitespace and quotation marks from a model reply
pub fn clean_reply(raw: &str) -> String {
    const QUOTES: &[char] = &['"', '\'', '`', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'];
    raw.trim().trim_matches(QUOTES).trim().to_string()
}
