//! Server configuration.

use std::path::PathBuf;

use agora_sync::PollingConfig;

use crate::error::{Error, Result};

/// Configuration for the visualization server binary.
#[derive(Debug, Clone)]
pub struct VisConfig {
    pub polling: PollingConfig,
    /// Payload file; `{conversation}` is replaced by the conversation id
    pub payload_path: PathBuf,
    /// Optional participant-of-interest feed file
    pub interest_feed: Option<PathBuf>,
    pub port: u16,
}

impl VisConfig {
    /// Read configuration from environment variables.
    ///
    /// On top of the [`PollingConfig::from_env`] variables:
    /// `AGORA_PAYLOAD` (default `data/{conversation}.json`),
    /// `AGORA_INTEREST_FEED` and `AGORA_VIS_PORT` (default 3000).
    pub fn from_env() -> Result<Self> {
        let polling = PollingConfig::from_env()?;

        let payload_path = PathBuf::from(
            std::env::var("AGORA_PAYLOAD").unwrap_or_else(|_| "data/{conversation}.json".to_string()),
        );
        let interest_feed = std::env::var("AGORA_INTEREST_FEED").ok().map(PathBuf::from);
        let port = match std::env::var("AGORA_VIS_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| Error::Config(format!("invalid AGORA_VIS_PORT: {e}")))?,
            Err(_) => 3000,
        };

        Ok(Self {
            polling,
            payload_path,
            interest_feed,
            port,
        })
    }
}
