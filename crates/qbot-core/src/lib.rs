//! # qbot-core
//!
//! The guided-questionnaire engine.
//!
//! - [`validator`] - admissibility checks for candidate questions
//! - [`QuestionGenerator`] - model call with one stricter retry and a fallback
//! - [`Conversation`] - the ordered question/answer transcript
//! - [`ProgressionController`] - the per-turn state machine
//! - [`QuestionnaireService`] - session turns over a [`ConversationStore`]
//!   with background export through an [`ArchiveQueue`]

mod archive;
mod config;
mod controller;
mod conversation;
mod error;
mod generator;
mod prompts;
mod service;
mod store;
mod topics;
pub mod validator;

pub use archive::ArchiveQueue;
pub use config::{
    QuestionnaireConfig, DEFAULT_DUPLICATE_THRESHOLD, DEFAULT_FALLBACK_SENTENCE,
    DEFAULT_FIRST_QUESTION, DEFAULT_MAX_QUESTIONS,
};
pub use controller::{ProgressionController, Reply, Turn};
pub use conversation::{Conversation, ItemRole, QaItem, QaPair, Stage, Transcript};
pub use error::{
    ConversationError, GenerationError, ServiceError, SinkError, StoreError, TurnError,
};
pub use generator::{
    clean_reply, GenerationOutcome, Generated, QuestionGenerator, RejectedCandidate,
    MAX_QUESTION_TOKENS, PRIMARY_TEMPERATURE, RETRY_TEMPERATURE,
};
pub use prompts::QuestionPrompts;
pub use service::{QuestionnaireService, TurnResponse};
pub use store::{ConversationStore, MemoryStore, StoredConversation, TranscriptSink};
pub use topics::{Topic, TopicCoverage};
pub use validator::{is_duplicate, is_forbidden, similarity, Rejection};
