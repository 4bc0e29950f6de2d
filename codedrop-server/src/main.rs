use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use codedrop_server::{run_server_with_config, FetchPolicy, RelayConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// In-memory relay for code-addressed file transfers.
#[derive(Debug, Parser)]
#[command(name = "codedrop-relay", version)]
struct Args {
    /// Address to listen on [env: CODEDROP_BIND]
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Maximum session lifetime in seconds [env: CODEDROP_TTL_SECS]
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Seconds between expiry sweeps [env: CODEDROP_SWEEP_SECS]
    #[arg(long)]
    sweep_secs: Option<u64>,

    /// `single-use` or `repeatable` [env: CODEDROP_FETCH_POLICY]
    #[arg(long)]
    fetch_policy: Option<FetchPolicy>,

    /// Simultaneous connections accepted from one IP
    #[arg(long)]
    max_conns_per_ip: Option<usize>,
}

impl Args {
    fn apply(self, mut config: RelayConfig) -> anyhow::Result<RelayConfig> {
        if let Some(bind) = self.bind {
            config = config.with_bind_addr(bind);
        }
        if let Some(secs) = self.ttl_secs {
            config = config.with_session_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = self.sweep_secs {
            config = config.with_sweep_interval(Duration::from_secs(secs));
        }
        if let Some(policy) = self.fetch_policy {
            config = config.with_fetch_policy(policy);
        }
        if let Some(cap) = self.max_conns_per_ip {
            config.max_connections_per_ip = cap;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.apply(RelayConfig::from_env()?)?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tokio::select! {
        _ = run_server_with_config(listener, config) => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
