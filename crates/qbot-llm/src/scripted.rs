use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{Completion, CompletionRequest, LanguageModel, LlmError};

/// A model that replays a fixed queue of replies and records every request.
///
/// Used by tests and offline demos. Once the queue is drained every further
/// call fails with [`LlmError::ScriptExhausted`].
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Build a model that will return each string in order
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    /// Queue a full completion, e.g. one with a finish reason
    pub fn completion(self, completion: Completion) -> Self {
        self.lock_replies().push_back(Ok(completion));
        self
    }

    pub fn fail(self, error: LlmError) -> Self {
        self.lock_replies().push_back(Err(error));
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.lock_replies().push_back(Ok(Completion::new(text)));
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.lock_requests().len()
    }

    /// Replies not yet consumed
    pub fn remaining(&self) -> usize {
        self.lock_replies().len()
    }

    /// Snapshot of the requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock_requests().clone()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Completion, LlmError>>> {
        self.replies.lock().expect("Scripted model lock poisoned")
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<CompletionRequest>> {
        self.requests.lock().expect("Scripted model lock poisoned")
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        self.lock_requests().push(request);
        match self.lock_replies().pop_front() {
            Some(Ok(completion)) => Ok(completion),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::ScriptExhausted),
        }
    }
}
