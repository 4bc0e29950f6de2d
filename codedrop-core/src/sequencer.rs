//! Sender-side chunk sequencing.
//!
//! A file is split into fixed-size windows numbered from 0. The sequencer
//! reads exactly one window per call, so at most one chunk of file data is
//! buffered at a time; the async driver decides when to ask for the next one.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::code::SessionCode;
use crate::codec;
use crate::error::ReadError;
use crate::message::Chunk;

/// Default window size: 512 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Random-access byte source a file is read from.
pub trait ByteSource {
    /// Total length in bytes.
    fn size(&self) -> u64;

    /// Read bytes `start..end`. Must return exactly `end - start` bytes.
    fn read_range(&mut self, start: u64, end: u64) -> io::Result<Vec<u8>>;
}

/// In-memory byte source.
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {
    /// Wrap owned bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_range(&mut self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let (start, end) = (start as usize, end as usize);
        self.bytes
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "range past end of source"))
    }
}

/// Byte source over an open file.
///
/// The size is captured at open time; a file that shrinks underneath the
/// sender surfaces as a short read.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    size: u64,
}

impl FileSource {
    /// Open `path` for sequential chunk reads.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let len = end.saturating_sub(start) as usize;
        let mut buffer = vec![0u8; len];
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

/// Number of chunks a file of `size` bytes is split into.
///
/// An empty file still produces one (empty) chunk so every file has at least
/// one chunk on the wire.
pub fn total_chunks(size: u64, chunk_size: usize) -> usize {
    let chunk_size = chunk_size.max(1) as u64;
    size.div_ceil(chunk_size).max(1) as usize
}

/// Splits one file into ordered [`Chunk`]s.
#[derive(Debug)]
pub struct ChunkSequencer<S> {
    source: S,
    session_code: SessionCode,
    file_name: String,
    file_index: usize,
    total_files: usize,
    chunk_size: usize,
    total_chunks: usize,
    next_index: usize,
    failed: bool,
}

impl<S: ByteSource> ChunkSequencer<S> {
    /// Prepare to send `source` as file `file_index` of `total_files`.
    ///
    /// A `chunk_size` of 0 is treated as 1.
    pub fn new(
        source: S,
        session_code: SessionCode,
        file_name: impl Into<String>,
        file_index: usize,
        total_files: usize,
        chunk_size: usize,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        let total_chunks = total_chunks(source.size(), chunk_size);
        Self {
            source,
            session_code,
            file_name: file_name.into(),
            file_index,
            total_files,
            chunk_size,
            total_chunks,
            next_index: 0,
            failed: false,
        }
    }

    /// Chunks this file is split into.
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// Chunks produced so far.
    pub fn emitted(&self) -> usize {
        self.next_index
    }

    /// File name carried on every chunk.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Read and encode the next window.
    ///
    /// Returns `Ok(None)` once every chunk has been produced. After a
    /// [`ReadError`] the sequencer is exhausted; a retry means restarting the
    /// whole file.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, ReadError> {
        if self.failed || self.next_index >= self.total_chunks {
            return Ok(None);
        }

        let size = self.source.size();
        let start = (self.next_index as u64 * self.chunk_size as u64).min(size);
        let end = (start + self.chunk_size as u64).min(size);

        let bytes = match self.source.read_range(start, end) {
            Ok(bytes) if bytes.len() as u64 == end - start => bytes,
            Ok(bytes) => {
                self.failed = true;
                return Err(self.read_error(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short read: got {} of {} bytes", bytes.len(), end - start),
                )));
            }
            Err(source) => {
                self.failed = true;
                return Err(self.read_error(source));
            }
        };

        let chunk = Chunk {
            session_code: self.session_code.clone(),
            file_name: self.file_name.clone(),
            file_index: self.file_index,
            chunk_index: self.next_index,
            total_chunks: self.total_chunks,
            total_files: self.total_files,
            payload: codec::encode(&bytes),
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }

    fn read_error(&self, source: io::Error) -> ReadError {
        ReadError {
            file_name: self.file_name.clone(),
            chunk_index: self.next_index,
            source,
        }
    }
}
