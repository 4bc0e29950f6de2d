//! Wire vocabulary.
//!
//! Every websocket text message is one JSON object, adjacently tagged:
//!
//! ```text
//! { "type": "<message-name>", "data": <payload> }
//! ```
//!
//! Parsing is strict. Unknown tags, unknown fields and ill-formed session
//! codes are rejected rather than guessed at.

use serde::{Deserialize, Serialize};

use crate::code::SessionCode;
use crate::error::ProtocolError;

/// One ordered slice of a file, as carried by `send-file-chunk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Chunk {
    /// Session the chunk belongs to.
    pub session_code: SessionCode,
    /// Name of the file, identical on every chunk of that file.
    pub file_name: String,
    /// 0-based, dense position of the file within the session.
    pub file_index: usize,
    /// 0-based ordinal of this chunk within its file.
    pub chunk_index: usize,
    /// Number of chunks the file was split into.
    pub total_chunks: usize,
    /// Number of files in the session.
    pub total_files: usize,
    /// Codec-encoded byte window.
    pub payload: String,
}

/// One finished file, as carried by `receive-file-chunk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileDelivery {
    /// Original file name.
    pub file_name: String,
    /// Codec-encoded file contents.
    pub payload: String,
    /// 1-based position of this file in the delivery, so `index == totalFiles`
    /// marks the last one.
    pub index: usize,
    /// Number of files being delivered.
    pub total_files: usize,
    /// Hex SHA-256 of the decoded contents.
    pub sha256: String,
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Ask the relay to mint a session.
    StartSession,
    /// Upload one chunk.
    SendFileChunk(Chunk),
    /// Ask for the files of a completed session.
    FetchFiles(SessionCode),
}

/// Messages the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum RelayMessage {
    /// Reply to `start-session`.
    SessionCreated(SessionCode),
    /// One reassembled file; sent in file order.
    ReceiveFileChunk(FileDelivery),
    /// Human-readable failure for the last request.
    Error(String),
}

impl ClientMessage {
    /// Parse and validate a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] for anything that is not a
    /// known message shape.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    /// Serialize to a text frame.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}

impl RelayMessage {
    /// Parse and validate a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] for anything that is not a
    /// known message shape.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    /// Serialize to a text frame.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    /// Build an `error` message from any displayable failure.
    pub fn error(err: impl std::fmt::Display) -> Self {
        Self::Error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code() -> SessionCode {
        SessionCode::parse("HJK234").unwrap()
    }

    #[test]
    fn test_start_session_shape() {
        let text = ClientMessage::StartSession.to_text().unwrap();
        assert_eq!(text, r#"{"type":"start-session"}"#);
        assert_eq!(
            ClientMessage::parse(&text).unwrap(),
            ClientMessage::StartSession
        );
    }

    #[test]
    fn test_chunk_uses_camel_case_fields() {
        let msg = ClientMessage::SendFileChunk(Chunk {
            session_code: code(),
            file_name: "a.txt".into(),
            file_index: 0,
            chunk_index: 2,
            total_chunks: 3,
            total_files: 1,
            payload: "AAEC".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "send-file-chunk",
                "data": {
                    "sessionCode": "HJK234",
                    "fileName": "a.txt",
                    "fileIndex": 0,
                    "chunkIndex": 2,
                    "totalChunks": 3,
                    "totalFiles": 1,
                    "payload": "AAEC"
                }
            })
        );
    }

    #[test]
    fn test_fetch_files_carries_code() {
        let parsed = ClientMessage::parse(r#"{"type":"fetch-files","data":"hjk234"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::FetchFiles(code()));
    }

    #[test]
    fn test_rejects_unknown_tag_and_shape() {
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"delete-everything"}"#),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert!(ClientMessage::parse(r#"{"type":"fetch-files","data":42}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
        // extra field inside the chunk
        let text = json!({
            "type": "send-file-chunk",
            "data": {
                "sessionCode": "HJK234", "fileName": "a", "fileIndex": 0,
                "chunkIndex": 0, "totalChunks": 1, "totalFiles": 1,
                "payload": "", "extra": true
            }
        })
        .to_string();
        assert!(ClientMessage::parse(&text).is_err());
    }

    #[test]
    fn test_relay_messages() {
        let created = RelayMessage::SessionCreated(code()).to_text().unwrap();
        assert_eq!(created, r#"{"type":"session-created","data":"HJK234"}"#);

        let err = RelayMessage::error(ProtocolError::UnknownSession);
        assert_eq!(
            err.to_text().unwrap(),
            r#"{"type":"error","data":"unknown session"}"#
        );

        let delivery = RelayMessage::ReceiveFileChunk(FileDelivery {
            file_name: "b.bin".into(),
            payload: "AA==".into(),
            index: 1,
            total_files: 1,
            sha256: "00".into(),
        });
        let text = delivery.to_text().unwrap();
        assert!(text.contains(r#""type":"receive-file-chunk""#));
        assert!(text.contains(r#""totalFiles":1"#));
        assert_eq!(RelayMessage::parse(&text).unwrap(), delivery);
    }
}
