//! WebSocket client for the Binance user data stream
//!
//! One connection per listen key. Pings are answered inline and never
//! surface as messages.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, ToolError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a received frame means to the reader
#[derive(Debug, PartialEq)]
enum Inbound {
    Payload(String),
    Ping(Vec<u8>),
    Control,
    Closed(String),
}

impl From<Message> for Inbound {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Inbound::Payload(text),
            Message::Binary(data) => Inbound::Payload(String::from_utf8_lossy(&data).into_owned()),
            Message::Ping(data) => Inbound::Ping(data),
            Message::Pong(_) | Message::Frame(_) => Inbound::Control,
            Message::Close(Some(frame)) => Inbound::Closed(format!(
                "Closed by server: {} {}",
                u16::from(frame.code),
                frame.reason
            )),
            Message::Close(None) => Inbound::Closed("Closed by server".to_string()),
        }
    }
}

/// WebSocket client for a single listen key
pub struct WebSocketClient {
    stream: Option<WsStream>,
    endpoint: String,
    listen_key: String,
}

impl WebSocketClient {
    /// Create a new WebSocket client
    pub fn new(endpoint: &str, listen_key: &str) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            listen_key: listen_key.to_string(),
        }
    }

    /// Stream URL, `{endpoint}/{listenKey}`
    pub fn url(&self) -> String {
        format!("{}/{}", self.endpoint, self.listen_key)
    }

    /// Connect to the WebSocket endpoint
    pub async fn connect(&mut self) -> Result<()> {
        // Never log the full listen key
        info!(endpoint = %self.endpoint, "Connecting to Binance user data stream");

        let (ws_stream, response) = connect_async(self.url()).await.map_err(|e| {
            ToolError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");
        self.stream = Some(ws_stream);

        Ok(())
    }

    /// Receive the next payload, `None` after a control frame
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ToolError::WebSocketConnection("Not connected".to_string()))?;

        let inbound = match stream.next().await {
            Some(Ok(message)) => Inbound::from(message),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                return Err(ToolError::WebSocketMessage(e.to_string()));
            }
            None => Inbound::Closed("Stream ended".to_string()),
        };

        match inbound {
            Inbound::Payload(text) => {
                debug!(len = text.len(), "Received user stream message");
                Ok(Some(text))
            }
            Inbound::Ping(data) => {
                debug!("Received ping, sending pong");
                stream
                    .send(Message::Pong(data))
                    .await
                    .map_err(|e| ToolError::WebSocketMessage(e.to_string()))?;
                Ok(None)
            }
            Inbound::Control => Ok(None),
            Inbound::Closed(reason) => {
                warn!(reason = %reason, "User stream connection closed");
                self.stream = None;
                Err(ToolError::WebSocketConnection(reason))
            }
        }
    }

    /// Send a ping to keep connection alive
    pub async fn ping(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .send(Message::Ping(vec![]))
                .await
                .map_err(|e| ToolError::WebSocketMessage(e.to_string()))?;
        }
        Ok(())
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_listen_key() {
        let client = WebSocketClient::new("wss://stream.testnet.binance.vision/ws/", "abc123");
        assert_eq!(client.url(), "wss://stream.testnet.binance.vision/ws/abc123");
    }

    #[test]
    fn test_frames_classified() {
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;

        assert_eq!(
            Inbound::from(Message::Text("{\"e\":\"executionReport\"}".to_string())),
            Inbound::Payload("{\"e\":\"executionReport\"}".to_string())
        );
        assert_eq!(
            Inbound::from(Message::Binary(b"{}".to_vec())),
            Inbound::Payload("{}".to_string())
        );
        assert_eq!(Inbound::from(Message::Ping(vec![1])), Inbound::Ping(vec![1]));
        assert_eq!(Inbound::from(Message::Pong(vec![])), Inbound::Control);

        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "listen key expired".into(),
        }));
        match Inbound::from(close) {
            Inbound::Closed(reason) => assert!(reason.contains("listen key expired")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recv_before_connect_fails() {
        let mut client = WebSocketClient::new("wss://example.invalid/ws", "key");
        assert!(matches!(
            client.recv().await,
            Err(ToolError::WebSocketConnection(_))
        ));
    }
}
