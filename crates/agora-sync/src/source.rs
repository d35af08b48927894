//! Where projection payloads come from.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use agora_model::{InterestFeed, MathPayload, MathTick};
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Result of one conditional payload fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A payload newer than the one held
    Fresh(Box<MathPayload>),
    /// The held payload is current
    NotModified,
    /// The conversation has no projection and will not get one
    NotFound,
    /// The fetch failed; the next cycle tries again
    TransientError(String),
}

impl FetchOutcome {
    pub fn fresh(payload: MathPayload) -> Self {
        Self::Fresh(Box::new(payload))
    }
}

/// A provider of projection payloads and participant-of-interest feeds.
pub trait ProjectionSource: Send + Sync + 'static {
    /// Fetch the payload unless `last_tick` is still current.
    fn fetch_math(
        &self,
        conversation_id: &str,
        last_tick: Option<MathTick>,
    ) -> impl Future<Output = FetchOutcome> + Send;

    /// Fetch the participants of interest.
    fn fetch_participants_of_interest(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<InterestFeed>> + Send;
}

/// Reads payloads from JSON files on disk.
///
/// Paths may contain `{conversation}`, replaced by the conversation id.
#[derive(Debug, Clone)]
pub struct FileSource {
    payload: PathBuf,
    interest: Option<PathBuf>,
}

impl FileSource {
    pub fn new(payload: impl Into<PathBuf>) -> Self {
        Self {
            payload: payload.into(),
            interest: None,
        }
    }

    /// Also read participants of interest from a feed file.
    #[must_use]
    pub fn with_interest_feed(mut self, path: impl Into<PathBuf>) -> Self {
        self.interest = Some(path.into());
        self
    }

    fn resolve(path: &Path, conversation_id: &str) -> PathBuf {
        PathBuf::from(path.to_string_lossy().replace("{conversation}", conversation_id))
    }
}

impl ProjectionSource for FileSource {
    async fn fetch_math(&self, conversation_id: &str, last_tick: Option<MathTick>) -> FetchOutcome {
        let path = Self::resolve(&self.payload, conversation_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return FetchOutcome::NotFound,
            Err(e) => return FetchOutcome::TransientError(format!("{}: {e}", path.display())),
        };

        let payload = match MathPayload::from_json(&bytes) {
            Ok(payload) => payload,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Undecodable projection payload");
                return FetchOutcome::TransientError(e.to_string());
            }
        };

        if Some(payload.math_tick) == last_tick {
            debug!(math_tick = payload.math_tick.0, "Payload unchanged");
            return FetchOutcome::NotModified;
        }
        FetchOutcome::fresh(payload)
    }

    async fn fetch_participants_of_interest(&self, conversation_id: &str) -> Result<InterestFeed> {
        let Some(path) = &self.interest else {
            return Ok(InterestFeed::new());
        };
        let path = Self::resolve(path, conversation_id);
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::Source(format!("{} does not exist", path.display())),
            _ => Error::Io(e),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
