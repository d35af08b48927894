//! Error types for agora-sync.

use thiserror::Error;

/// Result type for agora-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while keeping a model live.
#[derive(Debug, Error)]
pub enum Error {
    /// The payload could not be turned into a model.
    #[error("model error: {0}")]
    Model(#[from] agora_model::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The projection source failed
    #[error("source error: {0}")]
    Source(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The coordinator task has stopped.
    #[error("coordinator is no longer running")]
    ChannelClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ChannelClosed
    }
}
