//! Runtime settings.
//!
//! Loaded from an optional TOML file, then overridden by `RDWATCH_*`
//! environment variables (`RDWATCH_HEALTH_INTERVAL_MS=10000`). Every field
//! has a default, so an empty configuration is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::data::DEFAULT_LOG_CAPACITY;
use crate::health::PollerConfig;
use crate::stream::ReconnectPolicy;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "RDWATCH";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Control url to use instead of the active stored endpoint.
    pub endpoint: Option<String>,
    pub reconnect_interval_ms: u64,
    pub reconnect_attempts: u32,
    pub health_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub dedup_window_ms: u64,
    pub transition_window_ms: u64,
    pub request_timeout_ms: u64,
    pub log_capacity: usize,
    /// Directory holding the endpoint list.
    pub store_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        let poller = PollerConfig::default();
        Self {
            endpoint: None,
            reconnect_interval_ms: policy.interval.as_millis() as u64,
            reconnect_attempts: policy.max_attempts,
            health_interval_ms: poller.interval.as_millis() as u64,
            probe_timeout_ms: poller.probe_timeout.as_millis() as u64,
            dedup_window_ms: poller.dedup_window.as_millis() as u64,
            transition_window_ms: poller.transition_window.as_millis() as u64,
            request_timeout_ms: rdwatch_client::api::DEFAULT_TIMEOUT.as_millis() as u64,
            log_capacity: DEFAULT_LOG_CAPACITY,
            store_dir: default_store_dir(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: Duration::from_millis(self.reconnect_interval_ms),
            max_attempts: self.reconnect_attempts,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.health_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            dedup_window: Duration::from_millis(self.dedup_window_ms),
            transition_window: Duration::from_millis(self.transition_window_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// `rdwatch` under the platform config directory, else `.rdwatch`.
fn default_store_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("rdwatch"))
        .unwrap_or_else(|| PathBuf::from(".rdwatch"))
}
