use mfe_channel::TransportError;
use mfe_persist::PersistError;

/// Errors from store engine operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A registered validator rejected the value. Nothing was written.
    #[error("validation failed for key {key:?}: {reason}")]
    Validation { key: String, reason: String },

    /// The persistent store failed. The cache may already reflect the write.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistError),

    /// The broadcast transport could not be joined at construction time.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The configuration or validator table is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The engine has been torn down with `destroy`.
    #[error("store has been destroyed")]
    Destroyed,

    /// A typed accessor could not convert the value.
    #[error("serialization error for key {key:?}: {reason}")]
    Serialization { key: String, reason: String },
}

impl StoreError {
    /// Returns `true` for [`StoreError::Validation`].
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns `true` for [`StoreError::Persistence`].
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
