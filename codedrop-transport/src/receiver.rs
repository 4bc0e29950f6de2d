//! Download side.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use codedrop_core::progress::ProgressTracker;
use codedrop_core::{codec, ClientMessage, FileDelivery, RelayMessage, SessionCode};

use crate::channel::{unexpected, RelayChannel};
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::sink::FileSink;

const NOT_READY_BACKOFF: Duration = Duration::from_millis(250);

/// Fetches the files of a completed session.
#[derive(Debug)]
pub struct Downloader {
    channel: RelayChannel,
    config: ClientConfig,
}

impl Downloader {
    /// Connect to the relay.
    pub async fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        let channel = RelayChannel::connect(&config).await?;
        Ok(Self { channel, config })
    }

    /// Fetch every file of `code` into `sink`.
    ///
    /// Returns the number of files stored. Each file is checked against its
    /// digest before it reaches the sink.
    pub async fn fetch<K: FileSink>(
        &mut self,
        code: &SessionCode,
        sink: &mut K,
        progress: Option<&watch::Sender<f64>>,
    ) -> Result<usize, TransportError> {
        self.channel
            .send(&ClientMessage::FetchFiles(code.clone()))
            .await?;

        let mut received = 0;
        let mut tracking: Option<ProgressTracker> = None;
        loop {
            let delivery = match self.channel.recv().await? {
                RelayMessage::ReceiveFileChunk(delivery) => delivery,
                RelayMessage::Error(reason) => return Err(TransportError::Relay(reason)),
                other => return Err(unexpected(&other)),
            };

            // The first delivery fixes the file count for the whole fetch.
            let tracker =
                tracking.get_or_insert_with(|| ProgressTracker::new(delivery.total_files));
            let total_files = tracker.total();
            check_sequence(&delivery, received, total_files)?;

            let bytes = verify(&delivery)?;
            sink.store(&delivery.file_name, &bytes)
                .map_err(|source| TransportError::Store {
                    file_name: delivery.file_name.clone(),
                    source,
                })?;
            received += 1;
            debug!(file = %delivery.file_name, index = received, total_files, "file received");

            let percent = tracker.advance();
            if let Some(tx) = progress {
                let _ = tx.send(percent);
            }
            if received == total_files {
                break;
            }
        }

        info!(session = %code.log_id(), files = received, "session downloaded");
        Ok(received)
    }

    /// [`Downloader::fetch`], retrying while the sender is still uploading.
    ///
    /// Gives up after the configured ready wait.
    pub async fn fetch_when_ready<K: FileSink>(
        &mut self,
        code: &SessionCode,
        sink: &mut K,
        progress: Option<&watch::Sender<f64>>,
    ) -> Result<usize, TransportError> {
        let deadline = Instant::now() + self.config.ready_wait;
        loop {
            match self.fetch(code, sink, progress).await {
                Err(err) if err.is_not_ready() && Instant::now() < deadline => {
                    debug!(session = %code.log_id(), "session not ready, retrying");
                    tokio::time::sleep(NOT_READY_BACKOFF).await;
                }
                result => return result,
            }
        }
    }

    /// Close the connection.
    pub async fn finish(mut self) {
        self.channel.close().await;
    }
}

/// Reject a delivery that is out of order or disagrees on the file count.
fn check_sequence(
    delivery: &FileDelivery,
    received: usize,
    total_files: usize,
) -> Result<(), TransportError> {
    if delivery.total_files != total_files {
        return Err(TransportError::UnexpectedResponse(format!(
            "totalFiles changed from {total_files} to {} at file {}",
            delivery.total_files, delivery.index
        )));
    }
    if delivery.index != received + 1 || delivery.index > total_files {
        return Err(TransportError::UnexpectedResponse(format!(
            "file {} of {total_files} after {received}",
            delivery.index
        )));
    }
    Ok(())
}

/// Decode a delivery and check it against its digest.
fn verify(delivery: &FileDelivery) -> Result<Vec<u8>, TransportError> {
    let bytes = codec::decode(&delivery.payload)?;
    let digest = hex::encode(Sha256::digest(&bytes));
    if !digest.eq_ignore_ascii_case(&delivery.sha256) {
        return Err(TransportError::IntegrityMismatch {
            file_name: delivery.file_name.clone(),
        });
    }
    Ok(bytes)
}
