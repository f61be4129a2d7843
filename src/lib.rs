//! # rdwatch
//!
//! Live watcher for rabbit-digger control endpoints.
//!
//! This crate keeps a local, always-current view of a remote proxy's state
//! over long-lived WebSocket streams, and tracks the reachability of every
//! known endpoint. It can be used as a library or through the `rdwatch`
//! command line tool.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                              Session                              │
//! │  ┌────────────────┐   ┌──────────────┐   ┌──────────────────────┐ │
//! │  │ stream::manager│──▶│ data::patch  │──▶│ data::rates          │ │
//! │  │ (reconnecting) │   │ (baseline)   │   │ (per-update deltas)  │ │
//! │  └───────┬────────┘   └──────────────┘   └──────────┬───────────┘ │
//! │          │                                          ▼             │
//! │          │            ┌──────────────┐     watch::Receiver<View>  │
//! │          └───────────▶│ data::logs   │                            │
//! │                       │ (bounded)    │                            │
//! │                       └──────────────┘                            │
//! └───────────────────────────────────────────────────────────────────┘
//!
//!   health::poller ──▶ health::probe × N ──▶ health::classify
//!   endpoints (KeyValueStore)        rdwatch_client::ApiClient (one-shot calls)
//! ```
//!
//! - **[`stream`]**: Connection lifecycle ([`ConnectionManager`], [`Controller`]) with
//!   bounded fixed-interval reconnection, and the two stream handlers
//! - **[`data`]**: Pure transforms - patch reconciliation, rate derivation, the log
//!   buffer, and display formatting
//! - **[`health`]**: Concurrent endpoint probes, in-flight de-duplication, status
//!   transitions and their presentation state
//! - **[`endpoints`]**: The persisted endpoint list
//! - **[`config`]**: Settings from file and environment
//!
//! Stream failures never surface as errors: a bad message is dropped and the
//! view marked stale, a dropped connection is retried, and a spent retry
//! budget shows as [`StreamStatus::Disconnected`]. Only one-shot requests
//! return errors to the caller.
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Follow connections of the active endpoint
//! rdwatch connections
//!
//! # Tail logs of a specific endpoint
//! rdwatch --endpoint http://10.0.0.2:8030 logs --filter example.com
//!
//! # Probe every stored endpoint
//! rdwatch health
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use rdwatch::{Endpoint, Session, Settings};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::open(Endpoint::local(), &Settings::default())?;
//!
//! let mut view = session.connections.subscribe();
//! while view.changed().await.is_ok() {
//!     let view = view.borrow();
//!     println!("{} connections ({})", view.connection_count(), view.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Reconciling without a connection
//!
//! ```
//! use rdwatch::{ConnectionMessage, RateTracker, Reconciler};
//!
//! let mut reconciler = Reconciler::new();
//! let mut rates = RateTracker::new();
//!
//! for payload in [
//!     r#"{"full":{"connections":{"c1":{"upload":100,"download":0}}}}"#,
//!     r#"{"patch":[{"op":"replace","path":"/connections/c1/upload","value":150}]}"#,
//! ] {
//!     let doc = match ConnectionMessage::parse(payload).unwrap() {
//!         ConnectionMessage::Full(doc) => reconciler.reset(doc),
//!         ConnectionMessage::Patch(patch) => reconciler.apply(&patch).unwrap(),
//!     };
//!     let sheet = rates.update(&doc);
//!     println!("c1: {:?}", sheet.get("c1"));
//! }
//! ```

pub mod clock;
pub mod config;
pub mod data;
pub mod endpoints;
pub mod error;
pub mod health;
pub mod session;
pub mod stream;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Settings;
pub use data::{apply_patch, compute_rates, EventBuffer, Rate, RateSheet, RateTracker, Reconciler};
pub use endpoints::{EndpointRegistry, FileStore, KeyValueStore, MemoryStore};
pub use error::{MessageError, ParseError, PatchError, ProbeError, StoreError, TransportError};
pub use health::{
    check_all, classify, HealthPoller, HttpProbe, PollingHandle, PresentationState, Probe,
    StatusBoard, StatusChange, StatusTransition,
};
pub use session::{Session, SessionError};
pub use stream::{
    CloseReason, ConnectionManager, ConnectionState, ConnectionStream, ConnectionsView,
    Connector, Controller, LogStream, ReconnectPolicy, StreamHandler, StreamStatus, WsConnector,
};

pub use rdwatch_client::{ApiClient, RequestError};
pub use rdwatch_types::{ConnectionMessage, Endpoint, LogEntry, LogLevel, TrafficSample};
