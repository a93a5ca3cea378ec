use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use qbot_logging::{LogEvent, Logger};

use crate::{
    ArchiveQueue, ConversationStore, ProgressionController, Reply, ServiceError, Stage,
    StoredConversation, Transcript,
};

/// Outcome of one session turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResponse {
    pub session_id: String,
    pub reply: Reply,
    pub stage: Stage,
    pub transcript: Transcript,
}

/// Session-level entry point: loads a conversation, runs one controller
/// turn, persists the result and hands completed transcripts to the archive.
///
/// Turns for the same session id are serialized; different sessions run
/// concurrently.
pub struct QuestionnaireService {
    controller: ProgressionController,
    store: Arc<dyn ConversationStore>,
    archive: Option<Arc<ArchiveQueue>>,
    session_ttl: Option<Duration>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    logger: Arc<Logger>,
}

impl QuestionnaireService {
    pub fn new(
        controller: ProgressionController,
        store: Arc<dyn ConversationStore>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            controller,
            store,
            archive: None,
            session_ttl: None,
            locks: Mutex::new(HashMap::new()),
            logger,
        }
    }

    pub fn with_archive(mut self, archive: Arc<ArchiveQueue>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// In-progress sessions idle longer than `ttl` start over
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    pub fn new_session_id() -> String {
        format!("session-{}", Uuid::new_v4())
    }

    pub fn controller(&self) -> &ProgressionController {
        &self.controller
    }

    /// Run one turn for `session_id`.
    ///
    /// A missing or expired session starts fresh. The new state is saved
    /// before returning; archive delivery happens in the background.
    pub async fn turn(&self, session_id: &str, answer: Option<&str>) -> Result<TurnResponse, ServiceError> {
        let result = {
            let lock = self.session_lock(session_id);
            let _guard = lock.lock().await;
            self.turn_locked(session_id, answer).await
        };
        self.release(session_id);
        result
    }

    async fn turn_locked(&self, session_id: &str, answer: Option<&str>) -> Result<TurnResponse, ServiceError> {
        let conversation = match self.store.load(session_id)? {
            Some(stored) if self.is_expired(&stored) => {
                info!(session_id = %session_id, "Session expired, starting fresh");
                self.controller.start()
            }
            Some(stored) => stored.conversation,
            None => {
                debug!(session_id = %session_id, "No stored session, starting fresh");
                self.controller.start()
            }
        };

        let turn = self.controller.advance(&conversation, answer).await?;

        if turn.changed {
            self.store.save(session_id, &turn.conversation)?;
        }

        if conversation.stage() == Stage::AwaitingFirstQuestion && turn.changed {
            self.logger.log(&LogEvent::SessionStarted {
                session_id: session_id.to_string(),
                max_questions: turn.conversation.max_questions(),
            });
        }

        let transcript = turn.conversation.transcript(session_id);
        if !conversation.is_finished() && turn.conversation.is_finished() {
            self.logger.log(&LogEvent::SessionCompleted {
                session_id: session_id.to_string(),
                questions: transcript.question_count,
                answers: transcript.answer_count,
            });
            if let Some(archive) = &self.archive {
                archive.enqueue(transcript.clone());
            }
        }

        Ok(TurnResponse {
            session_id: session_id.to_string(),
            reply: turn.reply,
            stage: turn.conversation.stage(),
            transcript,
        })
    }

    /// The completed transcript for `session_id`
    pub fn transcript(&self, session_id: &str) -> Result<Transcript, ServiceError> {
        match self.store.load(session_id)? {
            Some(stored) if stored.conversation.is_finished() => {
                Ok(stored.conversation.transcript(session_id))
            }
            _ => Err(ServiceError::NotFound(session_id.to_string())),
        }
    }

    /// Drain the archive queue, if one is attached
    pub async fn shutdown(&self) {
        if let Some(archive) = &self.archive {
            archive.shutdown().await;
        }
    }

    fn is_expired(&self, stored: &StoredConversation) -> bool {
        let Some(ttl) = self.session_ttl else {
            return false;
        };
        if stored.conversation.is_finished() {
            return false;
        }
        (Utc::now() - stored.updated_at)
            .to_std()
            .map(|age| age > ttl)
            .unwrap_or(false)
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("Session lock table poisoned");
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the per-session lock once nobody holds or waits on it
    fn release(&self, session_id: &str) {
        let mut locks = self.locks.lock().expect("Session lock table poisoned");
        if locks
            .get(session_id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false)
        {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().expect("Session lock table poisoned").len()
    }
}
