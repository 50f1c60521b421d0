use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested session does not exist in the store.
    #[error("session not found: {key}")]
    NotFound { key: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store directory could not be created.
    #[error("store path error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound context could not be serialized for storage.
    #[error("context serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The provided session key string is malformed.
    ///
    /// Expected format: `agent:{agent_id}:{channel}:{peer_kind}:{peer_id}`
    #[error("invalid session key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
