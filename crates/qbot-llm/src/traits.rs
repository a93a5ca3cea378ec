use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::{Completion, CompletionRequest, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Errors that can occur while talking to a language model service
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Model request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    #[error("Model configuration error: {0}")]
    Config(String),

    #[error("Scripted model has no more replies")]
    ScriptExhausted,
}

impl LlmError {
    /// Whether retrying the same request later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_) | LlmError::Timeout(_) | LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => matches!(status, 408 | 500 | 502 | 503 | 504),
            LlmError::Auth(_)
            | LlmError::InvalidResponse(_)
            | LlmError::Config(_)
            | LlmError::ScriptExhausted => false,
        }
    }
}

/// Connection settings for a chat-completion service
#[derive(Clone)]
pub struct ModelConfig {
    /// Model identifier sent with every request
    pub model: String,
    /// Base URL of an OpenAI-compatible API, without the trailing path
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// Per-request timeout (None = client default)
    pub timeout: Option<Duration>,
}

impl ModelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// The core abstraction for a chat-completion model.
///
/// Each call is independent: the full message context travels with the
/// request and the implementation keeps no conversation state.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable name (e.g. the model identifier)
    fn name(&self) -> &str;

    /// Request a single completion
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}
