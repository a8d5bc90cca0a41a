/// Errors produced by the broadcast transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel handle has been closed.
    #[error("channel closed: {0}")]
    Closed(String),

    /// A message handler is already installed on this handle.
    #[error("message handler already installed on channel {0}")]
    HandlerInstalled(String),

    /// Delivery needs an async runtime and none is running.
    #[error("no async runtime available to deliver messages")]
    NoRuntime,

    /// A message could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The channel name is not usable.
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience alias used throughout the channel crate.
pub type TransportResult<T> = Result<T, TransportError>;
