//! # rdwatch-types
//!
//! Wire types shared by the rdwatch client and its consumers. These match the
//! JSON produced by a rabbit-digger control API and the on-disk format of the
//! endpoint list.
//!
//! ## Contents
//!
//! - [`ConnectionMessage`]: a frame of the connection push stream, either a
//!   full snapshot or an RFC 6902 patch against the previous one
//! - [`LogEntry`]: one frame of the log push stream
//! - [`Endpoint`]: a named remote control endpoint
//! - [`TrafficSample`]: the per-connection counters retained between updates
//!
//! ## Example
//!
//! ```rust
//! use rdwatch_types::ConnectionMessage;
//!
//! let msg = ConnectionMessage::parse(r#"{"full":{"connections":{}}}"#).unwrap();
//! assert!(msg.is_full());
//!
//! let msg = ConnectionMessage::parse(
//!     r#"{"patch":[{"op":"replace","path":"/total_upload","value":10}]}"#,
//! )
//! .unwrap();
//! assert_eq!(msg.operation_count(), 1);
//! ```

mod endpoint;
mod log;
mod message;
mod sample;

pub use endpoint::*;
pub use log::*;
pub use message::*;
pub use sample::*;

/// Re-exported so consumers can build patches without naming the crate.
pub use json_patch::{Patch, PatchOperation};
