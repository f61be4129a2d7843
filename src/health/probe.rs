//! Reachability probes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::ProbeError;

/// Default upper bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Checks whether one control endpoint is reachable.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn probe(&self, url: &Url) -> Result<(), ProbeError>;
}

/// Probes `GET {url}/api/config`; any 2xx answer means online.
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing client (shared pool, custom TLS, ...).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &Url) -> Result<(), ProbeError> {
        let target = config_url(url);
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// `{url}/api/config`, keeping any base path of `url`.
fn config_url(url: &Url) -> Url {
    let mut target = url.clone();
    target.set_query(None);
    target.set_fragment(None);
    if let Ok(mut segments) = target.path_segments_mut() {
        segments.pop_if_empty().extend(["api", "config"]);
    }
    target
}

/// Probe every url concurrently and wait for all of them.
///
/// Urls that do not parse are skipped and absent from the result. Each
/// probe is bounded by `timeout`; an error, a non-success status or a
/// timeout all read as `false`.
pub async fn check_all<P>(probe: &P, urls: &[String], timeout: Duration) -> HashMap<String, bool>
where
    P: Probe + ?Sized,
{
    let probes = urls.iter().filter_map(|raw| match Url::parse(raw) {
        Ok(url) => Some(async move {
            let result = match tokio::time::timeout(timeout, probe.probe(&url)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout),
            };
            if let Err(e) = &result {
                debug!(url = %raw, error = %e, "Endpoint offline");
            }
            (raw.clone(), result.is_ok())
        }),
        Err(e) => {
            debug!(url = %raw, error = %e, "Skipping malformed endpoint url");
            None
        }
    });

    join_all(probes).await.into_iter().collect()
}
