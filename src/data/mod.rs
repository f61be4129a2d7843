//! Pure data processing for the push streams.
//!
//! Nothing here does I/O or touches a clock; the stream handlers call into
//! these types once per received message.
//!
//! ## Submodules
//!
//! - [`patch`]: Baseline reconciliation ([`Reconciler`], [`apply_patch`])
//! - [`rates`]: Per-connection traffic rates ([`RateTracker`], [`compute_rates`])
//! - [`logs`]: Bounded, pausable log buffer ([`EventBuffer`])
//! - [`format`]: Human-readable byte counts and rates
//!
//! ## Data Flow
//!
//! ```text
//! {"full": doc} | {"patch": [ops]}
//!        │
//!        ▼
//! Reconciler::reset() / apply()
//!        │
//!        ├──▶ Arc<Value> baseline (shared read-only)
//!        │
//!        └──▶ RateTracker::update() ──▶ RateSheet
//! ```

pub mod format;
pub mod logs;
pub mod patch;
pub mod rates;

pub use logs::{EventBuffer, DEFAULT_LOG_CAPACITY};
pub use patch::{apply_patch, Reconciler};
pub use rates::{compute_rates, Rate, RateSheet, RateTracker, SampleTable};
