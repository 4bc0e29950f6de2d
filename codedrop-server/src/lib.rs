//! codedrop relay
//!
//! Accepts websocket connections, mints session codes, reassembles uploaded
//! chunks in memory and hands complete sessions to receivers. Nothing is
//! persisted; every session is reclaimed within its TTL.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod config;
pub mod error;
pub mod registry;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tracing::{debug, info, warn};

use codedrop_core::{codec, ClientMessage, FileDelivery, RelayMessage};

pub use config::{FetchPolicy, RelayConfig};
pub use error::ServerError;
pub use registry::Registry;

type IpConnMap = Arc<DashMap<IpAddr, usize>>;

/// Run the relay with default settings until the listener fails.
pub async fn run_server(listener: TcpListener) {
    run_server_with_config(listener, RelayConfig::default()).await;
}

/// Run the relay with `config`, including the background expiry sweep.
pub async fn run_server_with_config(listener: TcpListener, config: RelayConfig) {
    let registry = Arc::new(Registry::from_config(&config));
    let _sweeper = AbortOnDrop(registry.spawn_sweeper(config.sweep_interval));
    serve(listener, registry, config).await;
}

/// Accept loop over an existing registry. The caller owns expiry sweeping.
pub async fn serve(listener: TcpListener, registry: Arc<Registry>, config: RelayConfig) {
    let config = Arc::new(config);
    let ip_conns: IpConnMap = Arc::new(DashMap::new());
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, ttl = ?config.session_ttl, "relay accepting connections");
    }

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "accept failed, relay stopping");
                break;
            }
        };

        let ip = peer_addr.ip();
        if !admit(&ip_conns, ip, config.max_connections_per_ip) {
            debug!(%peer_addr, "per-ip connection cap reached");
            continue;
        }

        let registry = Arc::clone(&registry);
        let config = Arc::clone(&config);
        let ip_conns = Arc::clone(&ip_conns);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, peer_addr, registry, &config).await {
                debug!(%peer_addr, error = %err, "connection ended with error");
            }
            release(&ip_conns, ip);
        });
    }
}

fn admit(ip_conns: &IpConnMap, ip: IpAddr, cap: usize) -> bool {
    let mut count = ip_conns.entry(ip).or_insert(0);
    if *count >= cap {
        return false;
    }
    *count += 1;
    true
}

fn release(ip_conns: &IpConnMap, ip: IpAddr) {
    if let Some(mut count) = ip_conns.get_mut(&ip) {
        *count = count.saturating_sub(1);
    }
    ip_conns.remove_if(&ip, |_, count| *count == 0);
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<Registry>,
    config: &RelayConfig,
) -> Result<(), ServerError> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_bytes);
    ws_config.max_frame_size = Some(config.max_message_bytes);

    let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    debug!(%peer_addr, "connection open");

    let (tx, mut rx) = mpsc::channel::<Message>(config.queue_depth);

    // Writer task owns ws_tx
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let result = read_loop(&mut ws_rx, &registry, &tx).await;

    drop(tx);
    let _ = writer.await;
    debug!(%peer_addr, "connection closed");
    result
}

async fn read_loop<S>(
    ws_rx: &mut S,
    registry: &Registry,
    tx: &mpsc::Sender<Message>,
) -> Result<(), ServerError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = ws_rx.next().await {
        match frame? {
            Message::Text(text) => {
                let msg = match ClientMessage::parse(&text) {
                    Ok(msg) => msg,
                    Err(err) => {
                        send(tx, RelayMessage::error(&err)).await?;
                        return Err(ServerError::InvalidFormat);
                    }
                };
                dispatch(msg, registry, tx).await?;
            }
            Message::Binary(_) => {
                send(tx, RelayMessage::error("binary frames are not supported")).await?;
                return Err(ServerError::InvalidFormat);
            }
            Message::Close(_) => break,
            // ping/pong are answered by tungstenite
            _ => {}
        }
    }
    Ok(())
}

async fn dispatch(
    msg: ClientMessage,
    registry: &Registry,
    tx: &mpsc::Sender<Message>,
) -> Result<(), ServerError> {
    match msg {
        ClientMessage::StartSession => {
            let code = registry.create_session();
            send(tx, RelayMessage::SessionCreated(code)).await
        }
        ClientMessage::SendFileChunk(chunk) => match registry.record_chunk(chunk) {
            Ok(_) => Ok(()),
            Err(err) => send(tx, RelayMessage::error(err)).await,
        },
        ClientMessage::FetchFiles(code) => match registry.fetch(&code) {
            Ok(files) => {
                let total_files = files.len();
                for (position, file) in files.into_iter().enumerate() {
                    let delivery = FileDelivery {
                        payload: codec::encode(&file.bytes),
                        file_name: file.file_name,
                        index: position + 1,
                        total_files,
                        sha256: file.sha256,
                    };
                    send(tx, RelayMessage::ReceiveFileChunk(delivery)).await?;
                }
                Ok(())
            }
            Err(err) => send(tx, RelayMessage::error(err)).await,
        },
    }
}

async fn send(tx: &mpsc::Sender<Message>, msg: RelayMessage) -> Result<(), ServerError> {
    let text = msg.to_text()?;
    tx.send(Message::Text(text))
        .await
        .map_err(|_| ServerError::ConnectionClosed)
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
