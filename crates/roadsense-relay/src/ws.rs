use async_trait::async_trait;
use async_tungstenite::tokio::{connect_async, ConnectStream};
use async_tungstenite::tungstenite::Message;
use async_tungstenite::WebSocketStream;
use futures_util::{SinkExt, StreamExt};

use crate::message::WireMessage;
use crate::transport::{WearableLink, WearableTransport};
use roadsense_foundation::RelayError;

/// WebSocket client transport to the wearable bridge.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl WearableTransport for WsTransport {
    async fn connect(&mut self) -> Result<Box<dyn WearableLink>, RelayError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RelayError::ConnectFailed(e.to_string()))?;
        tracing::info!(url = %self.url, "wearable channel connected");
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<ConnectStream>,
}

#[async_trait]
impl WearableLink for WsLink {
    async fn send(&mut self, msg: WireMessage) -> Result<(), RelayError> {
        let text = msg.encode()?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<WireMessage, RelayError> {
        loop {
            match self.stream.next().await {
                None => return Err(RelayError::Disconnected),
                Some(Err(e)) => return Err(RelayError::Transport(e.to_string())),
                Some(Ok(Message::Text(text))) => return WireMessage::decode(&text),
                Some(Ok(Message::Close(_))) => return Err(RelayError::Disconnected),
                // Protocol-level pings are answered by tungstenite itself;
                // anything else on the socket is not ours to interpret.
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
