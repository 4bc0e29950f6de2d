//! Upload side.
//!
//! Files go out strictly in order: every chunk of file `i` is handed to the
//! socket before the first chunk of file `i + 1` is read. Each send is awaited,
//! so at most one chunk of file data is held in memory at a time.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, info};

use codedrop_core::progress::ProgressTracker;
use codedrop_core::{
    ByteSource, ChunkSequencer, ClientMessage, FileSource, RelayMessage, SessionCode,
};

use crate::channel::{unexpected, RelayChannel};
use crate::config::ClientConfig;
use crate::error::TransportError;

/// Uploads files to a relay session.
#[derive(Debug)]
pub struct Uploader {
    channel: RelayChannel,
    config: ClientConfig,
}

impl Uploader {
    /// Connect to the relay.
    pub async fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        let channel = RelayChannel::connect(&config).await?;
        Ok(Self { channel, config })
    }

    /// Ask the relay for a new session and return its code.
    pub async fn start_session(&mut self) -> Result<SessionCode, TransportError> {
        self.channel.send(&ClientMessage::StartSession).await?;
        match self.channel.recv().await? {
            RelayMessage::SessionCreated(code) => {
                info!(session = %code.log_id(), "session started");
                Ok(code)
            }
            RelayMessage::Error(reason) => Err(TransportError::Relay(reason)),
            other => Err(unexpected(&other)),
        }
    }

    /// Upload in-memory or custom sources as one session.
    ///
    /// `files` are `(name, source)` pairs in upload order. Progress, if
    /// requested, is published after each file.
    pub async fn upload<S: ByteSource>(
        &mut self,
        code: &SessionCode,
        files: Vec<(String, S)>,
        progress: Option<&watch::Sender<f64>>,
    ) -> Result<(), TransportError> {
        if files.is_empty() {
            return Err(TransportError::NoFiles);
        }
        let total_files = files.len();
        let mut tracker = ProgressTracker::new(total_files);

        for (file_index, (name, source)) in files.into_iter().enumerate() {
            let mut sequencer = ChunkSequencer::new(
                source,
                code.clone(),
                name,
                file_index,
                total_files,
                self.config.chunk_size,
            );
            self.send_file(&mut sequencer).await?;

            let percent = tracker.advance();
            if let Some(tx) = progress {
                let _ = tx.send(percent);
            }
        }

        self.channel.check_rejected()?;
        info!(session = %code.log_id(), files = total_files, "upload sent");
        Ok(())
    }

    /// Upload files from disk as one session.
    ///
    /// Every path is opened before the first byte is sent.
    pub async fn upload_paths(
        &mut self,
        code: &SessionCode,
        paths: &[PathBuf],
        progress: Option<&watch::Sender<f64>>,
    ) -> Result<(), TransportError> {
        let files = paths
            .iter()
            .map(|path| {
                let source = FileSource::open(path).map_err(|source| TransportError::Open {
                    path: path.clone(),
                    source,
                })?;
                Ok((display_name(path), source))
            })
            .collect::<Result<Vec<_>, TransportError>>()?;

        self.upload(code, files, progress).await
    }

    /// Stream every chunk of one file.
    pub async fn send_file<S: ByteSource>(
        &mut self,
        sequencer: &mut ChunkSequencer<S>,
    ) -> Result<(), TransportError> {
        debug!(
            file = sequencer.file_name(),
            chunks = sequencer.total_chunks(),
            "sending file"
        );
        while let Some(chunk) = sequencer.next_chunk()? {
            self.channel.send(&ClientMessage::SendFileChunk(chunk)).await?;
            self.channel.check_rejected()?;
        }
        Ok(())
    }

    /// Close the connection once everything is flushed.
    pub async fn finish(mut self) {
        self.channel.close().await;
    }
}

/// Name carried on the wire: the final path component.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
