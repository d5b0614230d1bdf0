use crate::infrastructure::credentials::is_credential_protocol;
use crate::types::{Result, StreamError};
use async_trait::async_trait;
use futures::stream::StreamExt;
use futures::{Sink, Stream};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Outbound half of an established connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Inbound half of an established connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// An established, message-framed, bidirectional connection.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Everything needed for one handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub url: String,
    /// Ordered sub-protocol list, possibly ending in a `bearer.<token>` entry
    pub protocols: Vec<String>,
}

impl std::fmt::Debug for HandshakeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let protocols: Vec<&str> = self
            .protocols
            .iter()
            .map(|protocol| {
                if is_credential_protocol(protocol) {
                    "bearer.<redacted>"
                } else {
                    protocol.as_str()
                }
            })
            .collect();

        f.debug_struct("HandshakeRequest")
            .field("url", &self.url)
            .field("protocols", &protocols)
            .finish()
    }
}

/// Opens connections for a [`ConnectionManager`](crate::ConnectionManager).
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: HandshakeRequest) -> Result<Transport>;
}

/// WebSocket connector backed by tokio-tungstenite.
///
/// Sub-protocols travel in the `Sec-WebSocket-Protocol` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Build the client handshake request for `request`
    pub fn client_request(
        request: &HandshakeRequest,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut client_request = request.url.as_str().into_client_request()?;

        if !request.protocols.is_empty() {
            let value = HeaderValue::from_str(&request.protocols.join(", ")).map_err(|_| {
                StreamError::Handshake("sub-protocol list is not a valid header value".to_string())
            })?;
            client_request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        Ok(client_request)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, request: HandshakeRequest) -> Result<Transport> {
        tracing::debug!("Creating WebSocket connection to: {}", request.url);
        let client_request = Self::client_request(&request)?;

        let (ws_stream, response) = connect_async(client_request).await?;
        tracing::debug!("Handshake completed with status {}", response.status());

        let (sink, stream) = ws_stream.split();
        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(protocols: &[&str]) -> HandshakeRequest {
        HandshakeRequest {
            url: "wss://node-1.example/ws/logs".to_string(),
            protocols: protocols.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_client_request_sets_protocol_header() {
        let client_request =
            WebSocketConnector::client_request(&request(&["logs.v1", "bearer.tok"])).unwrap();
        assert_eq!(
            client_request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "logs.v1, bearer.tok"
        );
        assert_eq!(client_request.uri().path(), "/ws/logs");
        assert!(client_request.uri().query().is_none());
    }

    #[test]
    fn test_client_request_without_protocols() {
        let client_request = WebSocketConnector::client_request(&request(&[])).unwrap();
        assert!(client_request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[test]
    fn test_client_request_rejects_invalid_protocol() {
        let result = WebSocketConnector::client_request(&request(&["bearer.bad\nvalue"]));
        assert!(matches!(result, Err(StreamError::Handshake(_))));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", request(&["logs.v1", "bearer.secret-token"]));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("bearer.<redacted>"));
        assert!(rendered.contains("logs.v1"));
    }
}
