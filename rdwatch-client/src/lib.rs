//! # rdwatch-client
//!
//! Request layer for rabbit-digger control APIs.
//!
//! The push streams (connections and logs) are handled by the `rdwatch`
//! crate; this crate covers the one-shot actions: reading or replacing the
//! configuration, switching a `select` net, closing connections and the user
//! data store. Failures are returned to the caller as [`RequestError`], with
//! the message the server put in its `{"error": ...}` body.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rdwatch_client::ApiClient;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::builder()
//!         .endpoint("http://127.0.0.1:8030")
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     let config = client.get_config().await?;
//!     println!("{config:#}");
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod model;

pub use api::{ApiClient, ApiClientBuilder};
pub use error::RequestError;
pub use model::{DelayRequest, DelayResponse, ImportSource, Net, RegistryData, UserDataList};

/// Re-exported so callers of [`ApiClient::request`] need no direct reqwest dependency.
pub use reqwest::Method;
