use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor, execute,
    style::Print,
    terminal::{Clear, ClearType},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use codedrop_core::{SessionCode, DEFAULT_CHUNK_SIZE};
use codedrop_transport::{ClientConfig, DirectorySink, Downloader, Uploader};

const DEFAULT_RELAY: &str = "wss://127.0.0.1:8080";
const BAR_WIDTH: usize = 30;

/// Send files to someone with a short code.
#[derive(Debug, Parser)]
#[command(name = "codedrop", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload files and print the code to share.
    Send {
        /// Files to send, in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        relay: RelayArgs,

        /// Upload window size in bytes.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// Download the files behind a code.
    Receive {
        /// Code from the sender.
        code: String,

        #[command(flatten)]
        relay: RelayArgs,

        /// Directory to write files into.
        #[arg(long, short, default_value = ".")]
        out: PathBuf,

        /// Seconds to wait for a sender that is still uploading.
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },
}

#[derive(Debug, Args)]
struct RelayArgs {
    /// Relay URL.
    #[arg(long, env = "CODEDROP_RELAY", default_value = DEFAULT_RELAY)]
    relay: String,

    /// Allow plain ws:// (local development only).
    #[arg(long)]
    insecure_dev: bool,
}

impl RelayArgs {
    fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.relay.clone());
        if self.insecure_dev {
            config.with_insecure_dev()
        } else {
            config
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match Cli::parse().command {
        Command::Send {
            files,
            relay,
            chunk_size,
        } => send(files, relay.client_config().with_chunk_size(chunk_size)).await,
        Command::Receive {
            code,
            relay,
            out,
            wait,
        } => {
            let config = relay
                .client_config()
                .with_ready_wait(Duration::from_secs(wait));
            receive(&code, out, config).await
        }
    }
}

async fn send(files: Vec<PathBuf>, config: ClientConfig) -> anyhow::Result<()> {
    for path in &files {
        if !path.is_file() {
            bail!("'{}' is not a readable file", path.display());
        }
    }

    let mut uploader = Uploader::connect(config)
        .await
        .context("cannot reach relay")?;
    let code = uploader.start_session().await?;

    println!("Code: {code}");
    println!("On the other machine run: codedrop receive {code}");

    let (tx, rx) = watch::channel(0.0);
    let bar = spawn_progress("sending", rx);
    let result = uploader.upload_paths(&code, &files, Some(&tx)).await;
    drop(tx);
    let _ = bar.await;

    result?;
    uploader.finish().await;
    println!("Sent {} file(s).", files.len());
    Ok(())
}

async fn receive(code: &str, out: PathBuf, config: ClientConfig) -> anyhow::Result<()> {
    let code = SessionCode::parse(code).context("not a valid code")?;
    let mut sink = DirectorySink::new(&out)
        .with_context(|| format!("cannot create '{}'", out.display()))?;

    let mut downloader = Downloader::connect(config)
        .await
        .context("cannot reach relay")?;

    let (tx, rx) = watch::channel(0.0);
    let bar = spawn_progress("receiving", rx);
    let result = downloader.fetch_when_ready(&code, &mut sink, Some(&tx)).await;
    drop(tx);
    let _ = bar.await;

    match result {
        Ok(_) => {}
        Err(err) if err.is_unknown_session() => {
            bail!("no transfer found for {code}; it may have expired or already been received")
        }
        Err(err) => return Err(err.into()),
    }
    downloader.finish().await;

    for path in sink.saved() {
        println!("Saved {}", path.display());
    }
    Ok(())
}

/// Redraw a one-line progress bar on stderr until the sender side is dropped.
fn spawn_progress(label: &'static str, mut rx: watch::Receiver<f64>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stderr = io::stderr();
        let _ = draw(&mut stderr, label, 0.0);
        while rx.changed().await.is_ok() {
            let percent = *rx.borrow_and_update();
            let _ = draw(&mut stderr, label, percent);
        }
        let _ = writeln!(stderr);
    })
}

fn draw(out: &mut impl Write, label: &str, percent: f64) -> io::Result<()> {
    execute!(
        out,
        cursor::MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(render_bar(label, percent)),
    )?;
    out.flush()
}

fn render_bar(label: &str, percent: f64) -> String {
    let percent = percent.clamp(0.0, 100.0);
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "{label:>9} [{}{}] {percent:5.1}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}
