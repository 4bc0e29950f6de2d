//! Websocket channel to the relay.
//!
//! One websocket text message carries exactly one JSON message in either
//! direction. Binary frames from the relay are a protocol error.

use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::{Message as WsMessage, WebSocketConfig};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use codedrop_core::{ClientMessage, RelayMessage};

use crate::config::ClientConfig;
use crate::error::TransportError;

/// Connection to a relay.
pub(crate) struct RelayChannel {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for RelayChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayChannel").finish_non_exhaustive()
    }
}

impl RelayChannel {
    /// Connect to the relay named in `config`.
    pub async fn connect(config: &ClientConfig) -> Result<Self, TransportError> {
        config.check_url()?;

        // Deliveries carry whole files; the relay bounds what it accepts.
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = None;
        ws_config.max_frame_size = None;

        let (ws, _response) =
            connect_async_with_config(config.relay_url.as_str(), Some(ws_config), false)
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        debug!(url = %config.relay_url, "connected to relay");

        Ok(Self { ws })
    }

    /// Send one message.
    pub async fn send(&mut self, msg: &ClientMessage) -> Result<(), TransportError> {
        let text = msg.to_text()?;
        self.ws.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    /// Wait for the next relay message.
    pub async fn recv(&mut self) -> Result<RelayMessage, TransportError> {
        loop {
            match self.ws.next().await {
                Some(Ok(frame)) => {
                    if let Some(msg) = Self::decode(frame)? {
                        return Ok(msg);
                    }
                }
                Some(Err(e)) => return Err(TransportError::WebSocket(e)),
                None => return Err(TransportError::Disconnected),
            }
        }
    }

    /// Surface an error the relay already sent, without waiting.
    ///
    /// Uploads get no per-chunk acknowledgement; the relay only speaks up
    /// when something is wrong.
    pub fn check_rejected(&mut self) -> Result<(), TransportError> {
        while let Some(next) = self.ws.next().now_or_never() {
            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(TransportError::WebSocket(e)),
                None => return Err(TransportError::Disconnected),
            };
            match Self::decode(frame)? {
                Some(RelayMessage::Error(reason)) => return Err(TransportError::Relay(reason)),
                Some(other) => return Err(unexpected(&other)),
                None => continue,
            }
        }
        Ok(())
    }

    /// Close the connection, flushing anything still buffered.
    pub async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }

    fn decode(frame: WsMessage) -> Result<Option<RelayMessage>, TransportError> {
        match frame {
            WsMessage::Text(text) => Ok(Some(RelayMessage::parse(&text)?)),
            WsMessage::Binary(_) => Err(TransportError::UnexpectedResponse(
                "binary frame".into(),
            )),
            WsMessage::Close(_) => Err(TransportError::Disconnected),
            // Ping, Pong
            _ => Ok(None),
        }
    }
}

/// Error for a relay message that does not fit the current exchange.
pub(crate) fn unexpected(msg: &RelayMessage) -> TransportError {
    let kind = match msg {
        RelayMessage::SessionCreated(_) => "session-created",
        RelayMessage::ReceiveFileChunk(_) => "receive-file-chunk",
        RelayMessage::Error(_) => "error",
    };
    TransportError::UnexpectedResponse(kind.into())
}
