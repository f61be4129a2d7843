//! Everything watched for one endpoint.

use std::sync::Arc;

use rdwatch_client::{ApiClient, RequestError};
use rdwatch_types::Endpoint;
use tracing::info;

use crate::config::Settings;
use crate::error::TransportError;
use crate::stream::{
    ConnectionManager, ConnectionStream, Connector, LogStream, StreamOptions, WsConnector,
};

/// Failure setting up a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Stream(#[from] TransportError),

    #[error(transparent)]
    Request(#[from] RequestError),
}

/// The connection stream, the log stream and a request client for one
/// endpoint. Dropping the session closes both streams.
#[derive(Debug)]
pub struct Session {
    endpoint: Endpoint,
    pub connections: ConnectionStream,
    pub logs: LogStream,
    pub client: ApiClient,
}

impl Session {
    /// Open both streams over WebSocket.
    pub fn open(endpoint: Endpoint, settings: &Settings) -> Result<Self, SessionError> {
        Self::open_with(endpoint, settings, Arc::new(WsConnector))
    }

    /// Open both streams over `connector`.
    pub fn open_with(
        endpoint: Endpoint,
        settings: &Settings,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SessionError> {
        let manager = ConnectionManager::new(settings.reconnect_policy());
        let client = ApiClient::builder()
            .endpoint(&endpoint.url)
            .timeout(settings.request_timeout())
            .build()?;
        let connections = ConnectionStream::open(
            &manager,
            connector.clone(),
            &endpoint.url,
            StreamOptions::default(),
        )?;
        let logs = LogStream::open(&manager, connector, &endpoint.url, settings.log_capacity)?;

        info!(endpoint = %endpoint.name, url = %endpoint.url, "Session opened");
        Ok(Self {
            endpoint,
            connections,
            logs,
            client,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Close both streams.
    pub fn close(&self) {
        self.connections.close();
        self.logs.close();
    }
}
