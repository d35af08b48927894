//! Error types for agora-model.

use thiserror::Error;

/// Result type for agora-model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while turning a projection payload into a model.
///
/// Every variant is recoverable: the caller drops the cycle and keeps the
/// previously built model.
#[derive(Debug, Error)]
pub enum Error {
    /// Parallel arrays that must line up have different lengths.
    #[error("length mismatch in {field}: expected {expected}, got {actual}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The payload is structurally invalid.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The payload could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                field,
                expected,
                actual,
            })
        }
    }
}
