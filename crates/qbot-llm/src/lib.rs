mod openai;
mod scripted;
mod traits;
mod types;

pub use openai::OpenAiClient;
pub use scripted::ScriptedModel;
pub use traits::{LanguageModel, LlmError, ModelConfig};
pub use types::{ChatMessage, Completion, CompletionRequest, Role};

/// Default model used when none is configured
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
