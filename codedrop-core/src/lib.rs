//! codedrop protocol core
//!
//! Session-addressed chunked file transfer, independent of any transport.
//!
//! This crate provides:
//! - Codec for carrying raw bytes over a text-only channel
//! - Session codes and their validation
//! - Sender-side chunk sequencing over a random-access byte source
//! - Relay-side session model and in-order reassembly
//! - Advisory progress computation
//! - The wire message vocabulary
//!
//! # Invariants
//!
//! - Chunks of one file are accepted strictly as 0, 1, 2, ... with no
//!   reordering buffer
//! - A session is COMPLETE iff every declared file received exactly its
//!   declared chunk count
//! - Session state only moves forward
//! - Any violation is fatal for the session it addresses

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod code;
pub mod codec;
pub mod error;
pub mod message;
pub mod progress;
pub mod reassembly;
pub mod sequencer;
pub mod session;

pub use code::SessionCode;
pub use error::{ProtocolError, ReadError, Violation};
pub use message::{Chunk, ClientMessage, FileDelivery, RelayMessage};
pub use progress::ProgressTracker;
pub use reassembly::{accept_chunk, ChunkOutcome};
pub use sequencer::{ByteSource, ChunkSequencer, FileSource, MemorySource, DEFAULT_CHUNK_SIZE};
pub use session::{ReassembledFile, Session, SessionState};
