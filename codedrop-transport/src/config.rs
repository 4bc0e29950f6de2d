//! Client configuration.

use std::time::Duration;

use codedrop_core::DEFAULT_CHUNK_SIZE;

use crate::error::TransportError;

/// Default time a receiver keeps retrying a session that is still uploading.
pub const DEFAULT_READY_WAIT: Duration = Duration::from_secs(30);

/// Settings shared by uploaders and downloaders.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL, e.g. `wss://relay.example:8080`.
    pub relay_url: String,
    /// Upload window size in bytes.
    pub chunk_size: usize,
    /// How long a download waits for an unfinished session.
    pub ready_wait: Duration,
    /// Allow plain `ws://` (local development only).
    pub insecure_dev: bool,
}

impl ClientConfig {
    /// Configuration for `relay_url` with default chunking.
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            ready_wait: DEFAULT_READY_WAIT,
            insecure_dev: false,
        }
    }

    /// Set the upload window size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set how long downloads wait for an unfinished session.
    pub fn with_ready_wait(mut self, wait: Duration) -> Self {
        self.ready_wait = wait;
        self
    }

    /// Allow insecure `ws://` connections.
    ///
    /// Traffic and session codes travel in the clear. Only for local testing.
    pub fn with_insecure_dev(mut self) -> Self {
        self.insecure_dev = true;
        self
    }

    /// Reject URLs this configuration may not connect to.
    pub(crate) fn check_url(&self) -> Result<(), TransportError> {
        let url = self.relay_url.as_str();
        if url.starts_with("wss://") {
            return Ok(());
        }
        if url.starts_with("ws://") && self.insecure_dev {
            return Ok(());
        }
        if url.starts_with("ws://") {
            return Err(TransportError::InsecureUrl);
        }
        Err(TransportError::ConnectionFailed(format!(
            "unsupported relay url '{url}'"
        )))
    }
}
