//! Feed Server Binary
//!
//! Serves a single demonstration run over a websocket: resume, history,
//! delta, then live delivery, backed by a synthetic in-memory producer.
//!
//! Usage:
//!   feed_server --port 8765 --ring-capacity 200000
//!
//! Environment:
//!   FEED_HOST, FEED_PORT, FEED_RING_CAPACITY, FEED_WS_FORMAT, ... (see
//!   `--help` for the full set; every flag also reads from an env var).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use feedrun::feed::{AppState, FeedConfig, Run, RunSlot};
use feedrun::producers::synthetic;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("feed_server=debug".parse().unwrap()),
        )
        .init();

    let config = FeedConfig::parse();
    config.validate().context("invalid configuration")?;

    info!("Starting feed server");
    info!("  Bind: {}:{}", config.host, config.port);
    info!("  Ring capacity: {}", config.ring_capacity);
    info!("  Wire format: {}", config.ws_format);
    info!("  Total samples: {}", config.total_samples);

    let run = Arc::new(Run::new(config.ring_capacity));
    let run_slot = Arc::new(RunSlot::new(run.clone()));

    let synthetic_cfg = synthetic::SyntheticConfig { seed: config.seed, ..Default::default() };
    let samples = synthetic::build(&synthetic_cfg, config.total_samples, 0);
    let emit_sps = config.emit_samples_per_sec;
    let live_batch = config.live_batch;
    tokio::spawn(async move {
        feedrun::feed::playback::playback_from_memory(&run, samples, emit_sps, "demo", live_batch).await;
    });

    let state = AppState::new(run_slot, config.session_config());
    let app = feedrun::feed::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind")?;
    info!("Listening on {}", addr);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        std::process::exit(0);
    });

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
