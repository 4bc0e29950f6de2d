//! Chunk reassembly.
//!
//! Chunks for one file must arrive as 0, 1, 2, ... The sender guarantees this
//! ordering and the channel preserves it, so a gap is treated as a protocol
//! integrity failure rather than buffered for reordering.
//!
//! This is the only place a session advances from UPLOADING to COMPLETE.

use sha2::{Digest, Sha256};

use crate::codec;
use crate::error::{ProtocolError, Violation};
use crate::message::Chunk;
use crate::session::{FileUpload, Session, SessionState};

/// What a successfully accepted chunk changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// The chunk finished its file.
    pub file_complete: bool,
    /// The chunk finished the whole session.
    pub session_complete: bool,
}

/// Append `chunk` to `session`.
///
/// On error the session is left untouched; discarding it is the caller's
/// decision (see [`ProtocolError::is_session_fatal`]).
///
/// # Errors
///
/// - [`ProtocolError::OutOfOrderChunk`] if the ordinal is not the next one
/// - [`ProtocolError::Violation`] if totals or names conflict with recorded state
/// - [`ProtocolError::InvalidPayload`] if the payload does not decode
pub fn accept_chunk(session: &mut Session, chunk: Chunk) -> Result<ChunkOutcome, ProtocolError> {
    validate(session, &chunk)?;

    let bytes = codec::decode(&chunk.payload)?;

    if session.expected_files.is_none() {
        session.expected_files = Some(chunk.total_files);
    }
    if session.state == SessionState::Created {
        session.state = SessionState::Uploading;
    }

    let upload = session
        .files
        .entry(chunk.file_index)
        .or_insert_with(|| {
            FileUpload::new(chunk.file_index, chunk.file_name, chunk.total_chunks)
        });

    upload.buffer.extend_from_slice(&bytes);
    upload.received_chunks += 1;

    let file_complete = upload.is_complete();
    if file_complete {
        upload.sha256 = Some(hex::encode(Sha256::digest(upload.buffer.as_slice())));
    }

    let session_complete = session.all_files_complete();
    if session_complete {
        session.state = SessionState::Complete;
    }

    Ok(ChunkOutcome {
        file_complete,
        session_complete,
    })
}

/// Every check that can reject a chunk, run before any mutation.
fn validate(session: &Session, chunk: &Chunk) -> Result<(), ProtocolError> {
    if &chunk.session_code != session.code() {
        return Err(Violation::SessionMismatch.into());
    }

    match session.state {
        SessionState::Created | SessionState::Uploading => {}
        SessionState::Complete | SessionState::Fetched => {
            return Err(Violation::AlreadyComplete.into())
        }
        SessionState::Expired => return Err(ProtocolError::UnknownSession),
    }

    if chunk.total_files == 0 || chunk.total_chunks == 0 {
        return Err(Violation::EmptyTotals.into());
    }

    if let Some(recorded) = session.expected_files {
        if recorded != chunk.total_files {
            return Err(Violation::TotalFilesMismatch {
                recorded,
                claimed: chunk.total_files,
            }
            .into());
        }
    }

    if chunk.file_index >= chunk.total_files {
        return Err(Violation::FileIndexOutOfRange {
            file_index: chunk.file_index,
            total_files: chunk.total_files,
        }
        .into());
    }

    let expected = match session.files.get(&chunk.file_index) {
        Some(upload) => {
            if upload.total_chunks != chunk.total_chunks {
                return Err(Violation::TotalChunksMismatch {
                    file_index: chunk.file_index,
                    recorded: upload.total_chunks,
                    claimed: chunk.total_chunks,
                }
                .into());
            }
            if upload.file_name != chunk.file_name {
                return Err(Violation::FileNameMismatch {
                    file_index: chunk.file_index,
                }
                .into());
            }
            if upload.is_complete() {
                return Err(Violation::AlreadyComplete.into());
            }
            upload.received_chunks
        }
        None => 0,
    };

    if chunk.chunk_index != expected {
        return Err(ProtocolError::OutOfOrderChunk {
            file_index: chunk.file_index,
            expected,
            received: chunk.chunk_index,
        });
    }

    Ok(())
}
