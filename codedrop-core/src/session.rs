//! Relay-side session model.
//!
//! States: CREATED → UPLOADING → COMPLETE → FETCHED → EXPIRED
//!
//! Transitions only move forward. FETCHED may be skipped when expiry wins the
//! race. A session owns every file buffer it holds until it is fetched or
//! expired; buffers are zeroized when released.

use std::collections::BTreeMap;

use zeroize::Zeroizing;

use crate::code::SessionCode;

/// Session state enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Minted, no chunk seen yet.
    Created,
    /// At least one chunk recorded.
    Uploading,
    /// Every declared file is complete.
    Complete,
    /// Delivered to a receiver.
    Fetched,
    /// Reclaimed by TTL or discarded after a violation. Final state.
    Expired,
}

/// Upload state for one file within a session.
#[derive(Debug)]
pub struct FileUpload {
    pub(crate) file_index: usize,
    pub(crate) file_name: String,
    pub(crate) total_chunks: usize,
    pub(crate) received_chunks: usize,
    pub(crate) buffer: Zeroizing<Vec<u8>>,
    pub(crate) sha256: Option<String>,
}

impl FileUpload {
    pub(crate) fn new(file_index: usize, file_name: String, total_chunks: usize) -> Self {
        Self {
            file_index,
            file_name,
            total_chunks,
            received_chunks: 0,
            buffer: Zeroizing::new(Vec::new()),
            sha256: None,
        }
    }

    /// Position of the file within its session.
    pub fn file_index(&self) -> usize {
        self.file_index
    }

    /// Name fixed by the first chunk.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Chunk count fixed by the first chunk.
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// Number of chunks appended so far. Also the next expected ordinal.
    pub fn received_chunks(&self) -> usize {
        self.received_chunks
    }

    /// Bytes reassembled so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no bytes have been reassembled yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True exactly when every declared chunk has been appended.
    pub fn is_complete(&self) -> bool {
        self.received_chunks == self.total_chunks
    }
}

/// A fully reassembled file handed out by a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledFile {
    /// Position within the session.
    pub file_index: usize,
    /// Original name.
    pub file_name: String,
    /// Exact original contents.
    pub bytes: Vec<u8>,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
}

/// Transient relay state for one transfer.
#[derive(Debug)]
pub struct Session {
    code: SessionCode,
    pub(crate) state: SessionState,
    pub(crate) expected_files: Option<usize>,
    pub(crate) files: BTreeMap<usize, FileUpload>,
}

impl Session {
    /// Create a session in `Created` with no files declared yet.
    pub fn new(code: SessionCode) -> Self {
        Self {
            code,
            state: SessionState::Created,
            expected_files: None,
            files: BTreeMap::new(),
        }
    }

    /// Session code.
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// File count fixed by the first chunk, if any chunk arrived.
    pub fn expected_files(&self) -> Option<usize> {
        self.expected_files
    }

    /// Upload state for one file.
    pub fn file(&self, file_index: usize) -> Option<&FileUpload> {
        self.files.get(&file_index)
    }

    /// Number of files seen so far.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Whether every declared file is complete.
    pub fn all_files_complete(&self) -> bool {
        match self.expected_files {
            Some(expected) => {
                self.files.len() == expected && self.files.values().all(FileUpload::is_complete)
            }
            None => false,
        }
    }

    /// Copy out the finished files in index order.
    ///
    /// Returns `None` unless the session is `Complete` or `Fetched`.
    pub fn reassembled_files(&self) -> Option<Vec<ReassembledFile>> {
        if !matches!(self.state, SessionState::Complete | SessionState::Fetched) {
            return None;
        }
        let files = self
            .files
            .values()
            .map(|f| ReassembledFile {
                file_index: f.file_index,
                file_name: f.file_name.clone(),
                bytes: f.buffer.to_vec(),
                sha256: f.sha256.clone().unwrap_or_default(),
            })
            .collect();
        Some(files)
    }

    /// Move the finished files out and transition to `Fetched`.
    ///
    /// Returns `None` unless the session is `Complete`. Used by single-use
    /// fetches, where the session is discarded right after.
    pub fn take_files(&mut self) -> Option<Vec<ReassembledFile>> {
        if self.state != SessionState::Complete {
            return None;
        }
        self.state = SessionState::Fetched;
        let files = std::mem::take(&mut self.files)
            .into_values()
            .map(|mut f| ReassembledFile {
                file_index: f.file_index,
                bytes: std::mem::take(&mut *f.buffer),
                sha256: f.sha256.take().unwrap_or_default(),
                file_name: f.file_name,
            })
            .collect();
        Some(files)
    }

    /// Move to `Fetched`. No-op unless currently `Complete`.
    pub fn mark_fetched(&mut self) {
        if self.state == SessionState::Complete {
            self.state = SessionState::Fetched;
        }
    }

    /// Move to `Expired` and release every buffer.
    ///
    /// Idempotent.
    pub fn expire(&mut self) {
        self.state = SessionState::Expired;
        // Dropping the uploads zeroizes their buffers.
        self.files.clear();
    }
}
