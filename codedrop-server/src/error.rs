//! Relay errors.

use codedrop_core::ProtocolError;
use thiserror::Error;

/// Errors that stop the relay or one of its connections.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Websocket handshake or I/O failure on one connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Client sent something that is not a known message.
    #[error("invalid message format")]
    InvalidFormat,

    /// Outbound message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection's writer task has gone away.
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
