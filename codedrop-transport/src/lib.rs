//! codedrop transport
//!
//! Async client for a codedrop relay. An [`Uploader`] mints a session and
//! streams files into it chunk by chunk; a [`Downloader`] redeems the code and
//! writes the files to a [`FileSink`].
//!
//! # Failure model
//!
//! - Transfers are not resumable. Any error ends the upload and the relay
//!   discards the session.
//! - Uploads are not acknowledged per chunk. Relay rejections are picked up
//!   between chunks.
//! - Downloads verify every file's SHA-256 before handing it to the sink.
//! - Plain `ws://` is refused unless insecure dev mode is set.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod channel;
pub mod config;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod sink;

pub use config::ClientConfig;
pub use error::TransportError;
pub use receiver::Downloader;
pub use sender::Uploader;
pub use sink::{DirectorySink, FileSink, MemorySink};
