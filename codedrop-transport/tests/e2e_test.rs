//! End-to-end tests for codedrop-transport against codedrop-server.

use std::time::Duration;

use codedrop_core::{codec, ClientMessage, FileDelivery, MemorySource, RelayMessage, SessionCode};
use codedrop_server::run_server;
use codedrop_transport::{
    ClientConfig, DirectorySink, Downloader, MemorySink, TransportError, Uploader,
};
use futures_util::{SinkExt, StreamExt};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

async fn start_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        run_server(listener).await;
    });
    format!("ws://{}", addr)
}

fn config(url: &str) -> ClientConfig {
    ClientConfig::new(url)
        .with_insecure_dev()
        .with_chunk_size(512_000)
        .with_ready_wait(Duration::from_secs(10))
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Collect every value published on `rx` until the sender is dropped.
fn record_progress(mut rx: watch::Receiver<f64>) -> JoinHandle<Vec<f64>> {
    tokio::spawn(async move {
        let mut seen = vec![*rx.borrow_and_update()];
        while rx.changed().await.is_ok() {
            seen.push(*rx.borrow_and_update());
        }
        seen
    })
}

fn delivery(name: &str, bytes: &[u8], index: usize, total_files: usize) -> RelayMessage {
    RelayMessage::ReceiveFileChunk(FileDelivery {
        file_name: name.into(),
        payload: codec::encode(bytes),
        index,
        total_files,
        sha256: hex::encode(Sha256::digest(bytes)),
    })
}

/// A relay stand-in that answers one `fetch-files` with `replies`.
async fn start_scripted_relay(replies: Vec<RelayMessage>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                assert!(matches!(
                    ClientMessage::parse(&text),
                    Ok(ClientMessage::FetchFiles(_))
                ));
                break;
            }
        }
        for reply in replies {
            let text = reply.to_text().unwrap();
            if ws.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        // Hold the socket open until the client hangs up.
        while let Some(Ok(_)) = ws.next().await {}
    });
    format!("ws://{}", addr)
}

/// Files on disk in, files on disk out.
#[tokio::test]
async fn test_directory_round_trip() {
    let url = start_relay().await;
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let small = src.path().join("notes.txt");
    let large = src.path().join("image.raw");
    std::fs::write(&small, b"0123456789").unwrap();
    std::fs::write(&large, patterned(1_500_000)).unwrap();

    let (progress_tx, progress_rx) = watch::channel(0.0);
    let mut uploader = Uploader::connect(config(&url)).await.unwrap();
    let code = uploader.start_session().await.unwrap();
    uploader
        .upload_paths(&code, &[small.clone(), large.clone()], Some(&progress_tx))
        .await
        .unwrap();
    uploader.finish().await;
    assert_eq!(*progress_rx.borrow(), 100.0);

    let (recv_tx, recv_rx) = watch::channel(0.0);
    let mut sink = DirectorySink::new(dst.path()).unwrap();
    let mut downloader = Downloader::connect(config(&url)).await.unwrap();
    let count = downloader
        .fetch_when_ready(&code, &mut sink, Some(&recv_tx))
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(*recv_rx.borrow(), 100.0);

    assert_eq!(std::fs::read(dst.path().join("notes.txt")).unwrap(), b"0123456789");
    assert_eq!(
        std::fs::read(dst.path().join("image.raw")).unwrap(),
        patterned(1_500_000)
    );
}

#[tokio::test]
async fn test_memory_round_trip_preserves_order() {
    let url = start_relay().await;
    let files = vec![
        ("c.bin".to_string(), MemorySource::new(patterned(1000))),
        ("a.bin".to_string(), MemorySource::new(Vec::new())),
        ("b.bin".to_string(), MemorySource::new(b"bee".to_vec())),
    ];

    let mut uploader = Uploader::connect(config(&url).with_chunk_size(64)).await.unwrap();
    let code = uploader.start_session().await.unwrap();
    uploader.upload(&code, files, None).await.unwrap();
    uploader.finish().await;

    let mut sink = MemorySink::new();
    let mut downloader = Downloader::connect(config(&url)).await.unwrap();
    downloader.fetch_when_ready(&code, &mut sink, None).await.unwrap();

    let received = sink.into_files();
    let names: Vec<_> = received.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["c.bin", "a.bin", "b.bin"]);
    assert_eq!(received[0].1, patterned(1000));
    assert!(received[1].1.is_empty());
    assert_eq!(received[2].1, b"bee");
}

#[tokio::test]
async fn test_code_is_single_use() {
    let url = start_relay().await;
    let mut uploader = Uploader::connect(config(&url)).await.unwrap();
    let code = uploader.start_session().await.unwrap();
    uploader
        .upload(&code, vec![("x".to_string(), MemorySource::new(b"x".to_vec()))], None)
        .await
        .unwrap();
    uploader.finish().await;

    let mut downloader = Downloader::connect(config(&url)).await.unwrap();
    downloader
        .fetch_when_ready(&code, &mut MemorySink::new(), None)
        .await
        .unwrap();

    let err = downloader
        .fetch(&code, &mut MemorySink::new(), None)
        .await
        .unwrap_err();
    assert!(err.is_unknown_session(), "{err}");
}

#[tokio::test]
async fn test_unknown_code() {
    let url = start_relay().await;
    let code = SessionCode::parse("QQQQQQ").unwrap();
    let mut downloader = Downloader::connect(config(&url)).await.unwrap();
    let err = downloader
        .fetch(&code, &mut MemorySink::new(), None)
        .await
        .unwrap_err();
    assert!(err.is_unknown_session(), "{err}");
}

#[tokio::test]
async fn test_empty_upload_rejected_locally() {
    let url = start_relay().await;
    let mut uploader = Uploader::connect(config(&url)).await.unwrap();
    let code = uploader.start_session().await.unwrap();
    let err = uploader
        .upload::<MemorySource>(&code, Vec::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NoFiles));
}

#[tokio::test]
async fn test_missing_file_fails_before_sending() {
    let url = start_relay().await;
    let dir = tempfile::tempdir().unwrap();
    let mut uploader = Uploader::connect(config(&url)).await.unwrap();
    let code = uploader.start_session().await.unwrap();
    let err = uploader
        .upload_paths(&code, &[dir.path().join("absent")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Open { .. }));
}

#[tokio::test]
async fn test_plain_ws_refused_by_default() {
    let url = start_relay().await;
    let err = Uploader::connect(ClientConfig::new(url)).await.unwrap_err();
    assert!(matches!(err, TransportError::InsecureUrl));
}

#[tokio::test]
async fn test_progress_is_monotonic_on_both_sides() {
    let url = start_relay().await;
    let files: Vec<_> = (0..5)
        .map(|i| (format!("part{i}.bin"), MemorySource::new(patterned(1000 * i))))
        .collect();

    let (tx, rx) = watch::channel(0.0);
    let sent = record_progress(rx);
    let mut uploader = Uploader::connect(config(&url)).await.unwrap();
    let code = uploader.start_session().await.unwrap();
    uploader.upload(&code, files, Some(&tx)).await.unwrap();
    drop(tx);
    uploader.finish().await;

    let (tx, rx) = watch::channel(0.0);
    let received = record_progress(rx);
    let mut sink = MemorySink::new();
    let mut downloader = Downloader::connect(config(&url)).await.unwrap();
    downloader
        .fetch_when_ready(&code, &mut sink, Some(&tx))
        .await
        .unwrap();
    drop(tx);

    for seen in [sent.await.unwrap(), received.await.unwrap()] {
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert_eq!(seen.last(), Some(&100.0));
        let early = &seen[..seen.len() - 1];
        assert!(early.iter().all(|p| *p < 100.0), "{seen:?}");
    }
}

#[tokio::test]
async fn test_shrinking_file_count_is_rejected() {
    let url = start_scripted_relay(vec![
        delivery("one.txt", b"first", 1, 3),
        delivery("two.txt", b"second", 2, 2),
    ])
    .await;
    let code = SessionCode::parse("ABCDEF").unwrap();
    let mut sink = MemorySink::new();
    let mut downloader = Downloader::connect(config(&url)).await.unwrap();

    let err = downloader.fetch(&code, &mut sink, None).await.unwrap_err();
    assert!(matches!(err, TransportError::UnexpectedResponse(_)), "{err}");
    assert_eq!(sink.files().len(), 1);
}

#[tokio::test]
async fn test_wss_url_reaches_tls_handshake() {
    // Accepts TCP and hangs up without speaking TLS.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let config = ClientConfig::new(format!("wss://{addr}"));
    let err = Downloader::connect(config).await.unwrap_err();
    match err {
        TransportError::ConnectionFailed(reason) => {
            assert!(!reason.contains("not compiled in"), "{reason}");
        }
        other => panic!("expected a connection failure, got {other}"),
    }
}
