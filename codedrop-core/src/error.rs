//! Protocol errors.
//!
//! Relay-side errors are reported to the requesting client as an `error`
//! message. Violations are fatal for the session they address: the relay
//! discards it rather than keep a corrupt buffer around.

use thiserror::Error;

/// Errors raised while routing, reassembling or fetching a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The code does not name a live session.
    #[error("unknown session")]
    UnknownSession,

    /// Fetch issued before every declared file is complete.
    #[error("session is not ready yet")]
    NotReady,

    /// A chunk arrived out of sequence for its file.
    #[error("out of order chunk for file {file_index}: expected {expected}, got {received}")]
    OutOfOrderChunk {
        /// File the chunk belongs to.
        file_index: usize,
        /// Next ordinal the reassembler was waiting for.
        expected: usize,
        /// Ordinal carried by the chunk.
        received: usize,
    },

    /// A chunk contradicts state already recorded for its session or file.
    #[error("protocol violation: {0}")]
    Violation(#[from] Violation),

    /// Payload is not valid transport text.
    #[error("invalid payload encoding")]
    InvalidPayload,

    /// A wire message did not match any known shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Session code failed validation.
    #[error("invalid session code")]
    InvalidCode,
}

impl ProtocolError {
    /// Whether the relay must discard the addressed session.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::OutOfOrderChunk { .. } | Self::Violation(_) | Self::InvalidPayload
        )
    }
}

/// Conflicts between a chunk and previously recorded state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    /// `totalChunks` differs from the value fixed by the file's first chunk.
    #[error("file {file_index} declared {recorded} chunks, chunk claims {claimed}")]
    TotalChunksMismatch {
        /// File index.
        file_index: usize,
        /// Value fixed by the first chunk.
        recorded: usize,
        /// Value on the offending chunk.
        claimed: usize,
    },

    /// `totalFiles` differs from the value fixed by the session's first chunk.
    #[error("session declared {recorded} files, chunk claims {claimed}")]
    TotalFilesMismatch {
        /// Value fixed by the first chunk.
        recorded: usize,
        /// Value on the offending chunk.
        claimed: usize,
    },

    /// `fileName` changed mid-file.
    #[error("file {file_index} renamed mid-transfer")]
    FileNameMismatch {
        /// File index.
        file_index: usize,
    },

    /// `fileIndex` is not below `totalFiles`.
    #[error("file index {file_index} out of range for {total_files} files")]
    FileIndexOutOfRange {
        /// File index.
        file_index: usize,
        /// Declared file count.
        total_files: usize,
    },

    /// `totalFiles` or `totalChunks` is zero.
    #[error("chunk declares zero files or zero chunks")]
    EmptyTotals,

    /// Chunk addressed a file or session that already finished uploading.
    #[error("chunk received after upload completed")]
    AlreadyComplete,

    /// Chunk addresses a different session than the one it was routed to.
    #[error("chunk addressed to another session")]
    SessionMismatch,
}

/// Sender-local failure reading a file's bytes.
///
/// Aborts the remaining chunks of that file. Never reaches the relay.
#[derive(Debug, Error)]
#[error("failed to read chunk {chunk_index} of '{file_name}': {source}")]
pub struct ReadError {
    /// Name of the file being sent.
    pub file_name: String,
    /// Ordinal of the chunk being read.
    pub chunk_index: usize,
    /// Underlying I/O failure.
    #[source]
    pub source: std::io::Error,
}
