//! WebSocket transport and stream url construction.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::manager::{Connection, Connector};
use crate::error::TransportError;

/// Opens WebSocket connections with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                }
                Ok(Message::Close(_)) => return None,
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Read(e.to_string()))),
            }
        }
    }
}

/// Url of the connection stream for an endpoint.
///
/// `patch=true` asks the server for one full document followed by patches.
pub fn connection_url(endpoint: &str, without_connections: bool) -> Result<Url, TransportError> {
    let mut url = stream_url(endpoint, "connection")?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("patch", "true");
        if without_connections {
            query.append_pair("without_connections", "true");
        }
    }
    Ok(url)
}

/// Url of the log stream for an endpoint.
pub fn log_url(endpoint: &str) -> Result<Url, TransportError> {
    stream_url(endpoint, "log")
}

/// `{endpoint}/api/v1/ws/{name}` with `http` mapped to `ws` and `https` to `wss`.
fn stream_url(endpoint: &str, name: &str) -> Result<Url, TransportError> {
    let invalid = || TransportError::InvalidUrl(endpoint.to_string());

    let mut url = Url::parse(endpoint).map_err(|_| invalid())?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid()),
    };
    url.set_scheme(scheme).map_err(|_| invalid())?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(["api", "v1", "ws", name]);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        let url = connection_url("http://127.0.0.1:8030", false).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8030/api/v1/ws/connection?patch=true");

        let url = connection_url("https://rdp.example.com/", true).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://rdp.example.com/api/v1/ws/connection?patch=true&without_connections=true"
        );
    }

    #[test]
    fn test_log_url_keeps_base_path() {
        let url = log_url("http://example.com/rdp/").unwrap();
        assert_eq!(url.as_str(), "ws://example.com/rdp/api/v1/ws/log");
    }

    #[test]
    fn test_rejects_unusable_endpoint() {
        assert!(matches!(log_url("not a url"), Err(TransportError::InvalidUrl(_))));
        assert!(matches!(
            log_url("ftp://example.com"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnector.connect(&format!("ws://{}/api/v1/ws/log", addr)).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
