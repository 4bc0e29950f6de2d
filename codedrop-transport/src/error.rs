//! Transport errors.

use std::io;
use std::path::PathBuf;

use codedrop_core::{ProtocolError, ReadError};
use thiserror::Error;

/// Errors from uploading to or downloading from a relay.
///
/// A failed upload is not resumable; the caller starts a new session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the relay.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// `ws://` used without opting into insecure mode.
    #[error("wss:// required (use insecure dev mode for local testing)")]
    InsecureUrl,

    /// Websocket failure after connecting.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The relay rejected a request.
    #[error("relay error: {0}")]
    Relay(String),

    /// Local protocol failure, e.g. an undecodable payload.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Reading a source file failed mid-upload.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// A source file could not be opened.
    #[error("cannot open '{}': {source}", path.display())]
    Open {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Writing a received file failed.
    #[error("cannot store '{file_name}': {source}")]
    Store {
        /// Name of the file being stored.
        file_name: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A delivered file does not match its digest.
    #[error("integrity check failed for '{file_name}'")]
    IntegrityMismatch {
        /// Name of the corrupted file.
        file_name: String,
    },

    /// The relay sent a message that does not fit the exchange.
    #[error("unexpected relay response: {0}")]
    UnexpectedResponse(String),

    /// Upload called with nothing to send.
    #[error("no files to send")]
    NoFiles,

    /// The relay closed the connection.
    #[error("relay disconnected")]
    Disconnected,
}

impl TransportError {
    /// Whether the relay reported the session as still uploading.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::Relay(reason) if *reason == ProtocolError::NotReady.to_string())
    }

    /// Whether the relay does not know the session code.
    pub fn is_unknown_session(&self) -> bool {
        matches!(self, Self::Relay(reason) if *reason == ProtocolError::UnknownSession.to_string())
    }
}
