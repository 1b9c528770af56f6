//! Transport-level errors

use thiserror::Error;

/// Failure to complete a remote round trip at all.
///
/// A round trip that completes with a rejecting status or body is not a
/// transport error; the sync layer classifies those itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("response channel closed before a reply arrived")]
    Closed,

    #[error("invalid response body: {0}")]
    Body(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Body(e.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
