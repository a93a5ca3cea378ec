use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize transcript: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Not a git repository: {0}")]
    NotARepo(String),

    #[error("Remote not configured: {0}")]
    NoRemote(String),

    #[error("Push rejected for {reference}: {message}")]
    PushRejected { reference: String, message: String },

    #[error("Session id cannot be used as a file name: {0}")]
    InvalidSessionId(String),
}
