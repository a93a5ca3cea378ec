use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Conversation, SinkError, StoreError, Transcript};

/// A conversation as persisted, with its last write time
#[derive(Debug, Clone, PartialEq)]
pub struct StoredConversation {
    pub conversation: Conversation,
    pub updated_at: DateTime<Utc>,
}

/// Persistence for in-progress and completed conversations, keyed by session id
pub trait ConversationStore: Send + Sync {
    fn load(&self, session_id: &str) -> Result<Option<StoredConversation>, StoreError>;

    /// Replace whatever is stored for `session_id`
    fn save(&self, session_id: &str, conversation: &Conversation) -> Result<(), StoreError>;
}

/// Export target for completed transcripts
pub trait TranscriptSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn deliver(&self, transcript: &Transcript) -> Result<(), SinkError>;
}

/// Process-local store, for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<String, StoredConversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrite the stored write time, e.g. to age a session
    pub fn set_updated_at(&self, session_id: &str, updated_at: DateTime<Utc>) {
        if let Some(stored) = self.lock().get_mut(session_id) {
            stored.updated_at = updated_at;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredConversation>> {
        self.conversations.lock().expect("Memory store lock poisoned")
    }
}

impl ConversationStore for MemoryStore {
    fn load(&self, session_id: &str) -> Result<Option<StoredConversation>, StoreError> {
        Ok(self.lock().get(session_id).cloned())
    }

    fn save(&self, session_id: &str, conversation: &Conversation) -> Result<(), StoreError> {
        self.lock().insert(
            session_id.to_string(),
            StoredConversation {
                conversation: conversation.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}
