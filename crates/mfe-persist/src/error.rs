use std::path::PathBuf;

/// Errors from persistent storage operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The backend could not open the requested database/table.
    #[error("failed to open {database}/{table}: {reason}")]
    Open {
        database: String,
        table: String,
        reason: String,
    },

    /// Serialization or deserialization of stored data failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A table file on disk could not be decoded.
    #[error("corrupt table file {path}: {reason}")]
    CorruptTable { path: PathBuf, reason: String },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refused the write (quota, read-only mode, and so on).
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The backend is unavailable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
