//! Error types for agora-vis.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type for agora-vis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the visualization server.
#[derive(Debug, Error)]
pub enum Error {
    /// The coordinator rejected or could not serve a request
    #[error("coordinator error: {0}")]
    Sync(#[from] agora_sync::Error),

    /// No model has been published yet
    #[error("no model published yet")]
    NoModel,

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NoModel => StatusCode::NOT_FOUND,
            Error::Sync(agora_sync::Error::ChannelClosed) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
