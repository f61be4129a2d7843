//! The log stream: one JSON log entry per message into an [`EventBuffer`].

use std::sync::Arc;

use parking_lot::Mutex;
use rdwatch_types::LogEntry;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::manager::{
    CloseReason, ConnectionManager, ConnectionState, Connector, Controller, StreamHandler,
};
use super::websocket::log_url;
use super::StreamStatus;
use crate::data::EventBuffer;
use crate::error::{ParseError, TransportError};

/// Change notification for the log stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogFeed {
    pub status: StreamStatus,
    /// Entries received and decoded, whether or not the buffer took them.
    pub received: u64,
}

/// Decodes log payloads into a shared buffer.
#[derive(Debug)]
pub struct LogsHandler {
    buffer: Arc<Mutex<EventBuffer>>,
    feed: watch::Sender<LogFeed>,
}

impl LogsHandler {
    pub fn new(buffer: Arc<Mutex<EventBuffer>>) -> (Self, watch::Receiver<LogFeed>) {
        let (feed, rx) = watch::channel(LogFeed::default());
        (Self { buffer, feed }, rx)
    }

    /// Decode one payload and append it.
    ///
    /// Returns whether the buffer accepted the entry (it drops entries while
    /// paused).
    pub fn handle(&mut self, payload: &str) -> Result<bool, ParseError> {
        let entry = LogEntry::parse(payload)?;
        let appended = self.buffer.lock().append(entry);
        self.feed.send_modify(|feed| feed.received += 1);
        Ok(appended)
    }

    fn set_status(&self, status: StreamStatus) {
        self.feed.send_if_modified(|feed| {
            if feed.status == status {
                return false;
            }
            feed.status = status;
            true
        });
    }
}

impl StreamHandler for LogsHandler {
    fn on_open(&mut self) {
        self.set_status(StreamStatus::Connected);
    }

    fn on_message(&mut self, payload: &str) {
        if let Err(e) = self.handle(payload) {
            warn!(error = %e, "Dropping log stream message");
        }
    }

    fn on_close(&mut self, reason: &CloseReason) {
        debug!(%reason, "Log stream closed");
        self.set_status(StreamStatus::after_close(reason));
    }

    fn on_reconnecting(&mut self, attempt: u32) {
        self.set_status(StreamStatus::Reconnecting { attempt });
    }
}

/// A running log stream with its buffer.
///
/// Pausing only gates the buffer; the connection stays up and entries that
/// arrive meanwhile are discarded.
#[derive(Debug)]
pub struct LogStream {
    controller: Controller,
    buffer: Arc<Mutex<EventBuffer>>,
    feed: watch::Receiver<LogFeed>,
}

impl LogStream {
    /// Open the log stream of `endpoint` with a buffer of `capacity` entries.
    pub fn open(
        manager: &ConnectionManager,
        connector: Arc<dyn Connector>,
        endpoint: &str,
        capacity: usize,
    ) -> Result<Self, TransportError> {
        let url = log_url(endpoint)?;
        let buffer = Arc::new(Mutex::new(EventBuffer::with_capacity(capacity)));
        let (handler, feed) = LogsHandler::new(buffer.clone());
        let controller = manager.open(connector, url.as_str(), handler);
        Ok(Self {
            controller,
            buffer,
            feed,
        })
    }

    pub fn pause(&self) {
        self.buffer.lock().pause();
    }

    pub fn resume(&self) {
        self.buffer.lock().resume();
    }

    /// Flip the pause state, returning the new one.
    pub fn toggle_pause(&self) -> bool {
        self.buffer.lock().toggle_pause()
    }

    pub fn is_paused(&self) -> bool {
        self.buffer.lock().is_paused()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    /// Copy of the buffered entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.buffer.lock().to_vec()
    }

    /// Buffered entries matching `query`.
    pub fn search(&self, query: &str) -> Vec<LogEntry> {
        self.buffer.lock().search(query).cloned().collect()
    }

    /// Watch for new entries and status changes.
    pub fn subscribe(&self) -> watch::Receiver<LogFeed> {
        self.feed.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn status(&self) -> StreamStatus {
        match self.controller.state() {
            ConnectionState::Closed(CloseReason::Explicit) => StreamStatus::Closed,
            _ => self.feed.borrow().status,
        }
    }

    pub fn close(&self) {
        self.controller.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::manager::Connection;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn line(n: usize) -> String {
        format!(
            r#"{{"timestamp":"2024-05-01T10:00:0{}Z","level":"INFO","fields":{{"message":"line {}"}},"target":"rd_server"}}"#,
            n % 10,
            n
        )
    }

    #[test]
    fn test_handle_appends() {
        let buffer = Arc::new(Mutex::new(EventBuffer::default()));
        let (mut handler, feed) = LogsHandler::new(buffer.clone());

        assert!(handler.handle(&line(1)).unwrap());
        assert_eq!(buffer.lock().len(), 1);
        assert_eq!(
            buffer.lock().latest().unwrap().display_message(),
            Some("line 1")
        );
        assert_eq!(feed.borrow().received, 1);
    }

    #[test]
    fn test_paused_buffer_discards_but_counts() {
        let buffer = Arc::new(Mutex::new(EventBuffer::default()));
        let (mut handler, feed) = LogsHandler::new(buffer.clone());

        buffer.lock().pause();
        assert!(!handler.handle(&line(1)).unwrap());
        assert!(buffer.lock().is_empty());
        assert_eq!(feed.borrow().received, 1);
    }

    #[test]
    fn test_malformed_line_is_dropped() {
        let buffer = Arc::new(Mutex::new(EventBuffer::default()));
        let (mut handler, feed) = LogsHandler::new(buffer.clone());

        handler.on_message("{oops");
        assert!(buffer.lock().is_empty());
        assert_eq!(feed.borrow().received, 0);
    }

    struct Lines(VecDeque<String>);

    #[async_trait]
    impl Connection for Lines {
        async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
            match self.0.pop_front() {
                Some(line) => Some(Ok(line)),
                None => {
                    std::future::pending::<()>().await;
                    None
                }
            }
        }
    }

    struct LinesConnector(usize);

    #[async_trait]
    impl Connector for LinesConnector {
        async fn connect(
            &self,
            url: &str,
        ) -> Result<Box<dyn Connection>, TransportError> {
            assert!(url.ends_with("/api/v1/ws/log"));
            Ok(Box::new(Lines((0..self.0).map(line).collect())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_caps_buffer() {
        let stream = LogStream::open(
            &ConnectionManager::default(),
            Arc::new(LinesConnector(25)),
            "http://127.0.0.1:8030",
            10,
        )
        .unwrap();

        let mut feed = stream.subscribe();
        feed.wait_for(|f| f.received == 25).await.unwrap();

        let entries = stream.entries();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].display_message(), Some("line 15"));
        assert_eq!(stream.status(), StreamStatus::Connected);
        assert_eq!(stream.search("line 2").len(), 5);

        stream.close();
        assert_eq!(stream.status(), StreamStatus::Closed);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(stream.entries().len(), 10);
    }
}
