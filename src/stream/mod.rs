//! Long-lived push streams.
//!
//! A stream is one reconnecting connection ([`manager`]) plus a handler that
//! turns raw payloads into consumer-visible state:
//!
//! - [`connections`]: full/patch documents, reconciled and annotated with rates
//! - [`logs`]: log entries into a bounded, pausable buffer
//!
//! The transport is abstracted behind [`Connector`]; [`WsConnector`] is the
//! WebSocket implementation used against a real endpoint.

pub mod connections;
pub mod logs;
pub mod manager;
pub mod websocket;

pub use connections::{ConnectionStream, ConnectionsHandler, ConnectionsView, StreamOptions};
pub use logs::{LogFeed, LogStream, LogsHandler};
pub use manager::{
    CloseReason, Connection, ConnectionManager, ConnectionState, Connector, Controller, Decision,
    ReconnectPolicy, Reconnector, StreamHandler,
};
pub use websocket::{connection_url, log_url, WsConnector};

use std::fmt;

/// Externally visible health of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    /// First connection attempt in progress.
    #[default]
    Connecting,
    /// Open and the view is current.
    Connected,
    /// Open, but the last message could not be applied; the view shows the
    /// last good state until the next full snapshot.
    Stale,
    /// Waiting before retry `attempt`.
    Reconnecting { attempt: u32 },
    /// Gave up after the retry budget, or the connection dropped and a
    /// retry has not been scheduled yet.
    Disconnected,
    /// Closed by the caller.
    Closed,
}

impl StreamStatus {
    /// Status after the connection closed for `reason`.
    pub fn after_close(reason: &CloseReason) -> Self {
        match reason {
            CloseReason::Explicit => StreamStatus::Closed,
            _ => StreamStatus::Disconnected,
        }
    }

    /// Whether the stream is currently delivering data.
    pub fn is_live(&self) -> bool {
        matches!(self, StreamStatus::Connected | StreamStatus::Stale)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Connecting => write!(f, "connecting"),
            StreamStatus::Connected => write!(f, "connected"),
            StreamStatus::Stale => write!(f, "stale"),
            StreamStatus::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {})", attempt)
            }
            StreamStatus::Disconnected => write!(f, "disconnected"),
            StreamStatus::Closed => write!(f, "closed"),
        }
    }
}
