//! Error types for the push streams, probes and the endpoint store.
//!
//! None of the stream errors escape to the consumer: they are logged and
//! turned into a state change (reconnect, stale view, offline endpoint).
//! Only the request layer propagates failures, see
//! [`rdwatch_client::RequestError`].

use thiserror::Error;

/// Socket or network failure on a push connection. Triggers a reconnect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// An established connection failed while reading.
    #[error("Read error: {0}")]
    Read(String),

    /// The endpoint url cannot be turned into a stream url.
    #[error("Invalid stream url: {0}")]
    InvalidUrl(String),
}

/// A patch could not be applied. The previous baseline stays in place.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    /// A patch arrived before any full snapshot.
    #[error("Patch received before any full snapshot")]
    NoBaseline,

    /// One of the operations failed (bad path, failed test, ...).
    #[error("Patch rejected: {0}")]
    Rejected(String),
}

/// A push-stream payload could not be decoded.
#[derive(Debug, Error)]
#[error("Parse error: {0}")]
pub struct ParseError(#[from] pub serde_json::Error);

/// Anything that makes a connection-stream message unusable.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// A health probe failed. Always resolves to "offline".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The endpoint answered with a non-success status.
    #[error("Endpoint returned status {0}")]
    Status(u16),

    /// Network-level failure.
    #[error("Probe failed: {0}")]
    Transport(String),

    /// No answer within the probe timeout.
    #[error("Probe timed out")]
    Timeout,
}

/// Failure persisting the endpoint list.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// No endpoint with the given id.
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),
}
