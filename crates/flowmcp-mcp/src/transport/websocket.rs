//! WebSocket client transport: one JSON-RPC message per text frame.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::{Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected WebSocket MCP server.
pub struct WebSocketTransport {
    url: String,
    stream: Option<WsStream>,
}

impl WebSocketTransport {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;

        debug!(url = %url, status = %response.status(), "WebSocket MCP connection established");

        Ok(Self {
            url: url.to_string(),
            stream: Some(stream),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))
    }

    async fn recv(&mut self) -> Option<String> {
        let stream = self.stream.as_mut()?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    return Some(String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(url = %self.url, ?frame, "WebSocket closed by server");
                    return None;
                }
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(url = %self.url, error = %e, "WebSocket read error");
                    return None;
                }
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(url = %self.url, error = %e, "WebSocket close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/mcp")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Connect(_)));
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
