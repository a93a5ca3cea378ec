//! Client for OpenAI-compatible Chat Completions endpoints.
//!
//! One HTTP request per call. Failures are classified and returned to the
//! caller; nothing is retried at this layer.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{ChatMessage, Completion, CompletionRequest, LanguageModel, LlmError, ModelConfig};

/// Default wait suggested when a 429 carries no usable retry-after header
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

pub struct OpenAiClient {
    model: String,
    api_key: String,
    base_url: String,
    timeout: Option<Duration>,
    http: Client,
}

impl OpenAiClient {
    pub fn from_config(config: &ModelConfig) -> Result<Self, LlmError> {
        debug!(?config, "Creating chat-completion client");

        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("API key is empty".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::Config("model name is empty".to_string()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request.messages.iter().map(message_json).collect();

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }

    fn classify_send_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout.unwrap_or_default())
        } else {
            LlmError::Network(err)
        }
    }
}

fn message_json(message: &ChatMessage) -> serde_json::Value {
    serde_json::json!({
        "role": message.role,
        "content": message.content,
    })
}

fn parse_retry_after(value: Option<&str>) -> Duration {
    let secs = value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs)
}

fn classify_status(status: StatusCode, retry_after: Option<&str>, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Auth(extract_error_message(&body)),
        429 => LlmError::RateLimited {
            retry_after: parse_retry_after(retry_after),
        },
        code => LlmError::ApiError {
            status: code,
            message: extract_error_message(&body),
        },
    }
}

/// Pull `error.message` out of an API error body, or return the body as-is
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn parse_response(response: ChatResponse) -> Result<Completion, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;

    let content = choice
        .message
        .content
        .ok_or_else(|| LlmError::InvalidResponse("choice carried no message content".to_string()))?;

    Ok(Completion {
        content,
        finish_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "Requesting completion"
        );
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Completion request failed");
            return Err(classify_status(status, retry_after.as_deref(), text));
        }

        let text = response.text().await.map_err(|e| self.classify_send_error(e))?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_response(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
