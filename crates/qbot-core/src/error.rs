use thiserror::Error;

use crate::{ItemRole, Stage};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Rejected changes to a conversation transcript
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("{role} item has no text")]
    EmptyItem { role: ItemRole },

    #[error("{role} item carries text in the wrong field")]
    MismatchedFields { role: ItemRole },

    #[error("Answer given but no question is waiting for one")]
    NoPendingQuestion,

    #[error("Cannot ask a new question while question {number} is unanswered")]
    QuestionPending { number: usize },

    #[error("Question limit of {max} reached")]
    LimitReached { max: usize },

    #[error("Conversation is complete")]
    Closed,

    #[error("Stored conversation is inconsistent: {0}")]
    InvalidHistory(String),

    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },
}

impl ConversationError {
    pub(crate) fn invalid_stage(stage: Stage, detail: &str) -> Self {
        ConversationError::InvalidHistory(format!("stage {} {}", stage, detail))
    }
}

/// Failure to produce the next question
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Language model call failed: {0}")]
    Model(#[from] qbot_llm::LlmError),
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Model(e) => e.is_retryable(),
        }
    }
}

/// Failure while running one controller turn
#[derive(Error, Debug)]
pub enum TurnError {
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl TurnError {
    /// True when the external model service failed and the turn can be retried
    pub fn is_model_failure(&self) -> bool {
        matches!(self, TurnError::Generation(GenerationError::Model(_)))
    }

    /// True when resubmitting the same turn later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TurnError::Generation(e) => e.is_retryable(),
            TurnError::Conversation(_) => false,
        }
    }
}

/// Error returned by a [`ConversationStore`](crate::ConversationStore)
#[derive(Error, Debug)]
#[error("Conversation store failed: {0}")]
pub struct StoreError(#[source] BoxError);

impl StoreError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self(source.into())
    }
}

/// Error returned by a [`TranscriptSink`](crate::TranscriptSink)
#[derive(Error, Debug)]
#[error("Transcript delivery failed: {0}")]
pub struct SinkError(#[source] BoxError);

impl SinkError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self(source.into())
    }
}

/// Errors surfaced by the session-level service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No completed transcript for session {0}")]
    NotFound(String),
}

impl ServiceError {
    pub fn is_model_failure(&self) -> bool {
        matches!(self, ServiceError::Turn(e) if e.is_model_failure())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Turn(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbot_llm::LlmError;
    use std::time::Duration;

    fn model_failure(e: LlmError) -> ServiceError {
        ServiceError::Turn(TurnError::Generation(GenerationError::Model(e)))
    }

    #[test]
    fn test_transient_model_failures_are_retryable() {
        let rate_limited = model_failure(LlmError::RateLimited {
            retry_after: Duration::from_secs(5),
        });
        assert!(rate_limited.is_model_failure());
        assert!(rate_limited.is_retryable());

        let unavailable = model_failure(LlmError::ApiError {
            status: 503,
            message: "overloaded".to_string(),
        });
        assert!(unavailable.is_retryable());
        assert!(model_failure(LlmError::Timeout(Duration::from_secs(60))).is_retryable());
    }

    #[test]
    fn test_permanent_model_failures_are_not_retryable() {
        for e in [
            LlmError::Auth("invalid key".to_string()),
            LlmError::InvalidResponse("no choices".to_string()),
            LlmError::Config("empty model".to_string()),
        ] {
            let err = model_failure(e);
            assert!(err.is_model_failure());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_other_errors_are_not_retryable() {
        let closed = ServiceError::Turn(TurnError::Conversation(ConversationError::Closed));
        assert!(!closed.is_retryable());
        assert!(!ServiceError::NotFound("s1".to_string()).is_retryable());
        assert!(!ServiceError::Store(StoreError::new("disk full")).is_retryable());
    }
}
