#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use peerdeck_relay::store::SignalStore;
use peerdeck_relay::{router, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "peerdeck-relay")]
struct Args {
    /// Address to bind; non-loopback requires PEERDECK_ALLOW_PUBLIC_BIND=1.
    #[arg(long, default_value = "127.0.0.1:8400")]
    listen: String,
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn check_public_bind_allowed(addr: SocketAddr) -> Result<()> {
    if addr.ip().is_loopback() {
        return Ok(());
    }
    if env_bool("PEERDECK_ALLOW_PUBLIC_BIND", false) {
        return Ok(());
    }
    Err(anyhow::anyhow!(
        "refusing non-loopback bind without PEERDECK_ALLOW_PUBLIC_BIND=1"
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "peerdeck_relay=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let ttl = Duration::from_secs(env_u64("PEERDECK_SIGNAL_TTL_SECS", 15 * 60).max(1));
    let capacity = env_u64("PEERDECK_SIGNAL_CAPACITY", 4096) as usize;
    let store = Arc::new(SignalStore::new(ttl, capacity));

    let addr: SocketAddr = args.listen.parse()?;
    check_public_bind_allowed(addr)?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("signal relay listening on {}", listener.local_addr()?);
    tracing::info!(
        "signal ttl {}s, store capacity {}",
        ttl.as_secs(),
        capacity
    );

    axum::serve(listener, router(AppState { store })).await?;
    Ok(())
}
