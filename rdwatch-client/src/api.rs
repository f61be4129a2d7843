//! Client for the control API's request/response endpoints.
//!
//! Every call is a single HTTP round trip against `{endpoint}/api/...`. A
//! non-2xx answer becomes [`RequestError::Api`] carrying the `error` string
//! from the response body.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rdwatch_client::ApiClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::builder()
//!         .endpoint("http://127.0.0.1:8030")
//!         .build()?;
//!
//!     client.select("proxy", "hk-01").await?;
//!     let closed = client.delete_conn("9a1e0d2c").await?;
//!     println!("closed: {closed}");
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::model::{
    DelayRequest, DelayResponse, ImportSource, RegistryData, SelectPayload, UserDataList,
};
use crate::RequestError;

/// Default endpoint of a local install.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8030";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request layer for one control endpoint.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    /// Issue a request against `{endpoint}/api{path}`.
    ///
    /// `path` starts with `/` and may carry a query string. The decoded JSON
    /// body is returned; an empty 2xx body decodes to `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RequestError> {
        let raw = format!("{}/api{}", self.base.as_str().trim_end_matches('/'), path);
        let url = Url::parse(&raw).map_err(|e| RequestError::InvalidUrl(e.to_string()))?;

        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(builder).await
    }

    /// Fetch the running configuration.
    pub async fn get_config(&self) -> Result<Value, RequestError> {
        let url = self.api_url(&["config"])?;
        self.send(self.client.get(url)).await
    }

    /// Replace the running configuration.
    pub async fn post_config(&self, source: &ImportSource) -> Result<(), RequestError> {
        let url = self.api_url(&["config"])?;
        self.send(self.client.post(url).json(source)).await?;
        Ok(())
    }

    /// List the registered plugins.
    pub async fn get_registry(&self) -> Result<RegistryData, RequestError> {
        let url = self.api_url(&["registry"])?;
        decode(self.send(self.client.get(url)).await?)
    }

    /// One-shot read of the connection table.
    pub async fn get_connections(&self) -> Result<Value, RequestError> {
        let url = self.api_url(&["connections"])?;
        self.send(self.client.get(url)).await
    }

    /// Close every active connection.
    pub async fn delete_connections(&self) -> Result<Value, RequestError> {
        let url = self.api_url(&["connections"])?;
        self.send(self.client.delete(url)).await
    }

    /// Fetch the engine state.
    pub async fn get_state(&self) -> Result<Value, RequestError> {
        let url = self.api_url(&["state"])?;
        self.send(self.client.get(url)).await
    }

    /// Switch a `select` net to one of its entries.
    pub async fn select(&self, net: &str, selected: &str) -> Result<(), RequestError> {
        let url = self.api_url(&["select", net])?;
        let payload = SelectPayload { selected };
        self.send(self.client.post(url).json(&payload)).await?;
        Ok(())
    }

    /// Close a single connection. Returns whether the server found it.
    pub async fn delete_conn(&self, uuid: &str) -> Result<bool, RequestError> {
        let url = self.api_url(&["conn", uuid])?;
        decode(self.send(self.client.delete(url)).await?)
    }

    /// Measure latency through a net. `None` when the test produced no result.
    pub async fn get_delay(
        &self,
        net: &str,
        request: &DelayRequest,
    ) -> Result<Option<DelayResponse>, RequestError> {
        let mut url = self.api_url(&["delay", net])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("url", &request.url);
            if let Some(timeout) = request.timeout {
                query.append_pair("timeout", &timeout.to_string());
            }
        }
        decode(self.send(self.client.get(url)).await?)
    }

    /// List the keys of the user data store.
    pub async fn list_userdata(&self) -> Result<UserDataList, RequestError> {
        let url = self.api_url(&["userdata"])?;
        decode(self.send(self.client.get(url)).await?)
    }

    /// Read one user data entry.
    pub async fn get_userdata<T: DeserializeOwned>(&self, key: &str) -> Result<T, RequestError> {
        let url = self.api_url(&["userdata", key])?;
        decode(self.send(self.client.get(url)).await?)
    }

    /// Store raw text under `key`. Returns the number of bytes written.
    pub async fn put_userdata(&self, key: &str, data: String) -> Result<u64, RequestError> {
        #[derive(Deserialize)]
        struct Copied {
            copied: u64,
        }

        let url = self.api_url(&["userdata", key])?;
        let copied: Copied = decode(self.send(self.client.put(url).body(data)).await?)?;
        Ok(copied.copied)
    }

    /// Remove one user data entry.
    pub async fn delete_userdata(&self, key: &str) -> Result<bool, RequestError> {
        #[derive(Deserialize)]
        struct Removed {
            ok: bool,
        }

        let url = self.api_url(&["userdata", key])?;
        let removed: Removed = decode(self.send(self.client.delete(url)).await?)?;
        Ok(removed.ok)
    }

    /// Build `{endpoint}/api/<segments...>`, percent-encoding each segment.
    fn api_url(&self, segments: &[&str]) -> Result<Url, RequestError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RequestError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, RequestError> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = RequestError::from_response(status, &text);
            debug!("API request failed with {}: {}", status, err);
            return Err(err);
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RequestError::Parse(e.to_string()))
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, RequestError> {
    serde_json::from_value(value).map_err(|e| RequestError::Parse(e.to_string()))
}

/// Builder for ApiClient.
#[derive(Debug, Default)]
pub struct ApiClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl ApiClientBuilder {
    /// Set the control endpoint (default: `http://127.0.0.1:8030`).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ApiClient, RequestError> {
        let endpoint = self
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let base = Url::parse(&endpoint).map_err(|e| RequestError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(RequestError::InvalidUrl(endpoint));
        }

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(ApiClient { client, base })
    }
}
