//! Database layer for qbot.
//!
//! Provides a unified `Database` struct that owns the SQLite connection
//! and provides access to domain-specific stores.

mod sessions;

pub use sessions::{SessionFilter, SessionRecord, SessionSummary, Sessions};

use qbot_core::{Conversation, ConversationStore, StoreError, StoredConversation};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// The main database struct that owns the SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the default location.
    ///
    /// The default location is `~/.local/share/qbot/qbot.db`.
    pub fn open() -> Result<Self, rusqlite::Error> {
        Self::open_at(&Self::default_path())
    }

    /// Open or create a database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, rusqlite::Error> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        debug!(path = %path.display(), "Opening database");
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the default database path.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qbot")
            .join("qbot.db")
    }

    /// Access the sessions store.
    pub fn sessions(&self) -> Sessions<'_> {
        let conn = self.conn.lock().expect("Database lock poisoned");
        Sessions::new(conn)
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                stage TEXT NOT NULL,
                max_questions INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS qa_items (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                role TEXT NOT NULL,
                question TEXT NOT NULL DEFAULT '',
                answer TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (session_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at DESC);
            CREATE INDEX IF NOT EXISTS idx_sessions_stage ON sessions(stage);
            "#,
        )
    }
}

impl ConversationStore for Database {
    fn load(&self, session_id: &str) -> Result<Option<StoredConversation>, StoreError> {
        let record = self.sessions().get(session_id).map_err(StoreError::new)?;
        Ok(record.map(|r| StoredConversation {
            conversation: r.conversation,
            updated_at: r.updated_at,
        }))
    }

    fn save(&self, session_id: &str, conversation: &Conversation) -> Result<(), StoreError> {
        self.sessions()
            .save(session_id, conversation)
            .map_err(StoreError::new)
    }
}
