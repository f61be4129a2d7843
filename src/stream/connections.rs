//! The connection stream: full/patch documents with per-connection rates.

use std::sync::Arc;

use rdwatch_types::ConnectionMessage;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::manager::{
    CloseReason, ConnectionManager, ConnectionState, Connector, Controller, StreamHandler,
};
use super::websocket::connection_url;
use super::StreamStatus;
use crate::data::{RateSheet, RateTracker, Reconciler};
use crate::error::{MessageError, ParseError, TransportError};

/// Consumer-visible state of the connection stream.
#[derive(Debug, Clone, Default)]
pub struct ConnectionsView {
    /// Latest reconciled document, `None` until the first full snapshot.
    pub document: Option<Arc<Value>>,
    /// Rates computed against the previous update.
    pub rates: RateSheet,
    pub status: StreamStatus,
    /// Number of messages applied so far.
    pub updates: u64,
}

impl ConnectionsView {
    /// The last message could not be applied.
    pub fn is_stale(&self) -> bool {
        self.status == StreamStatus::Stale
    }

    /// Connection records keyed by id.
    pub fn connections(&self) -> Option<&serde_json::Map<String, Value>> {
        self.document
            .as_deref()
            .and_then(|doc| doc.get("connections"))
            .and_then(Value::as_object)
    }

    /// Number of active connections in the document.
    pub fn connection_count(&self) -> usize {
        self.connections().map_or(0, |c| c.len())
    }
}

/// Turns connection-stream payloads into [`ConnectionsView`] updates.
///
/// Owns the stream's baseline and sample table; both are dropped with the
/// handler when the stream is torn down.
#[derive(Debug)]
pub struct ConnectionsHandler {
    reconciler: Reconciler,
    rates: RateTracker,
    view: watch::Sender<ConnectionsView>,
    /// A message was lost; the baseline is unreliable until the next full
    /// snapshot.
    resync_pending: bool,
}

impl ConnectionsHandler {
    pub fn new() -> (Self, watch::Receiver<ConnectionsView>) {
        let (view, rx) = watch::channel(ConnectionsView::default());
        let handler = Self {
            reconciler: Reconciler::new(),
            rates: RateTracker::new(),
            view,
            resync_pending: false,
        };
        (handler, rx)
    }

    /// Apply one payload and publish the result.
    ///
    /// On error nothing is published and the baseline is unchanged. After an
    /// error the view stays [`StreamStatus::Stale`] until the next full
    /// snapshot, even if later patches apply.
    pub fn handle(&mut self, payload: &str) -> Result<(), MessageError> {
        let document = match self.reconcile(payload) {
            Ok(document) => document,
            Err(e) => {
                self.resync_pending = true;
                return Err(e);
            }
        };
        let rates = self.rates.update(&document);
        let status = self.live_status();

        self.view.send_modify(|view| {
            view.document = Some(document);
            view.rates = rates;
            view.status = status;
            view.updates += 1;
        });
        Ok(())
    }

    fn reconcile(&mut self, payload: &str) -> Result<Arc<Value>, MessageError> {
        let message = ConnectionMessage::parse(payload).map_err(ParseError::from)?;
        match message {
            ConnectionMessage::Full(document) => {
                self.resync_pending = false;
                Ok(self.reconciler.reset(document))
            }
            ConnectionMessage::Patch(patch) => Ok(self.reconciler.apply(&patch)?),
        }
    }

    fn live_status(&self) -> StreamStatus {
        if self.resync_pending {
            StreamStatus::Stale
        } else {
            StreamStatus::Connected
        }
    }

    fn set_status(&self, status: StreamStatus) {
        self.view.send_if_modified(|view| {
            if view.status == status {
                return false;
            }
            view.status = status;
            true
        });
    }
}

impl StreamHandler for ConnectionsHandler {
    fn on_open(&mut self) {
        self.set_status(self.live_status());
    }

    fn on_message(&mut self, payload: &str) {
        if let Err(e) = self.handle(payload) {
            warn!(error = %e, "Dropping connection stream message");
            self.set_status(StreamStatus::Stale);
        }
    }

    fn on_close(&mut self, reason: &CloseReason) {
        debug!(%reason, "Connection stream closed");
        self.set_status(StreamStatus::after_close(reason));
    }

    fn on_reconnecting(&mut self, attempt: u32) {
        self.set_status(StreamStatus::Reconnecting { attempt });
    }
}

/// Options for opening the connection stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamOptions {
    /// Ask the server to leave out the per-connection records and only send
    /// totals.
    pub without_connections: bool,
}

/// A running connection stream.
#[derive(Debug)]
pub struct ConnectionStream {
    controller: Controller,
    view: watch::Receiver<ConnectionsView>,
}

impl ConnectionStream {
    /// Open the connection stream of `endpoint` (an `http(s)://` control url).
    pub fn open(
        manager: &ConnectionManager,
        connector: Arc<dyn Connector>,
        endpoint: &str,
        options: StreamOptions,
    ) -> Result<Self, TransportError> {
        let url = connection_url(endpoint, options.without_connections)?;
        let (handler, view) = ConnectionsHandler::new();
        let controller = manager.open(connector, url.as_str(), handler);
        Ok(Self { controller, view })
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> ConnectionsView {
        self.view.borrow().clone()
    }

    /// Watch view updates.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionsView> {
        self.view.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    /// Stream status, [`StreamStatus::Closed`] once closed by the caller.
    pub fn status(&self) -> StreamStatus {
        match self.controller.state() {
            ConnectionState::Closed(CloseReason::Explicit) => StreamStatus::Closed,
            _ => self.view.borrow().status,
        }
    }

    /// Close the stream. Its baseline and samples are discarded.
    pub fn close(&self) {
        self.controller.close();
    }
}
