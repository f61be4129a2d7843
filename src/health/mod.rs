//! Endpoint reachability.
//!
//! [`HealthPoller`] probes every configured control endpoint on a timer and
//! on demand, records status flips, and feeds [`classify`] which decides
//! what a health indicator shows.
//!
//! ```text
//! start(urls) ──tick──▶ refresh(urls) ──▶ check_all ──▶ Probe × N (concurrent, timed out)
//!                            │                               │
//!                            │◀──────── joins ───────────────┘ (same urls within dedup window)
//!                            ▼
//!                    statuses + transitions ──▶ StatusBoard::classify(url, now)
//! ```

pub mod classify;
pub mod poller;
pub mod probe;

pub use classify::{
    classify, classify_in_window, PresentationState, StatusTransition, TRANSITION_WINDOW,
};
pub use poller::{HealthPoller, PollerConfig, PollingHandle, StatusBoard, StatusChange};
pub use probe::{check_all, HttpProbe, Probe};
