//! Feed server configuration.
//!
//! A `clap::Parser` struct with per-field `env` fallbacks, following the
//! convention in `bin/edge_receiver.rs`. Defaults mirror the reference
//! server's constants (`RING_CAPACITY_DEFAULT`, `HISTORY_CHUNK_DEFAULT`, ...).

use anyhow::{ensure, Result};
use clap::Parser;

use super::session::SessionConfig;
use super::wire::WireFormat;

#[derive(Parser, Debug, Clone)]
#[command(name = "feed_server")]
#[command(about = "Sequenced, resumable time-series feed server")]
pub struct FeedConfig {
    /// Bind host.
    #[arg(long, env = "FEED_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port.
    #[arg(long, env = "FEED_PORT", default_value = "8765")]
    pub port: u16,

    /// Ring buffer capacity (max retained samples per run).
    #[arg(long, env = "FEED_RING_CAPACITY", default_value_t = 200_000)]
    pub ring_capacity: usize,

    /// Max samples per history/delta chunk sent to a resuming client.
    #[arg(long, env = "FEED_HISTORY_CHUNK", default_value_t = 4096)]
    pub history_chunk: usize,

    /// Max samples per live batch sent at once.
    #[arg(long, env = "FEED_LIVE_BATCH", default_value_t = 512)]
    pub live_batch: usize,

    /// Heartbeat interval, in seconds.
    #[arg(long, env = "FEED_HEARTBEAT_SEC", default_value_t = 5)]
    pub heartbeat_sec: u64,

    /// Live sender flush interval, in milliseconds.
    #[arg(long, env = "FEED_LIVE_FLUSH_MS", default_value_t = 20)]
    pub live_flush_ms: u64,

    /// Resume handshake timeout, in seconds.
    #[arg(long, env = "FEED_RESUME_TIMEOUT_SEC", default_value_t = 15)]
    pub resume_timeout_sec: u64,

    /// Wire format for data frames: "text" or "binary".
    #[arg(long, env = "FEED_WS_FORMAT", default_value = "text")]
    pub ws_format: String,

    /// Number of synthetic samples to build for the demo playback run.
    #[arg(long, env = "FEED_TOTAL_SAMPLES", default_value_t = 4000)]
    pub total_samples: usize,

    /// Synthetic emission rate in samples/sec; <= 0 means unpaced.
    #[arg(long, env = "FEED_EMIT_SAMPLES_PER_SEC", default_value_t = 0.0)]
    pub emit_samples_per_sec: f64,

    /// Seed for the synthetic producer's RNG. Unset draws fresh entropy.
    #[arg(long, env = "FEED_SEED")]
    pub seed: Option<u64>,
}

impl FeedConfig {
    /// Fails fast on non-positive ring/batch/chunk sizes, mirroring the
    /// reference server's `validate_and_log_config()`.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.ring_capacity > 0, "ring_capacity must be positive, got {}", self.ring_capacity);
        ensure!(self.history_chunk > 0, "history_chunk must be positive, got {}", self.history_chunk);
        ensure!(self.live_batch > 0, "live_batch must be positive, got {}", self.live_batch);
        Ok(())
    }

    pub fn wire_format(&self) -> WireFormat {
        match self.ws_format.as_str() {
            "binary" => WireFormat::Binary,
            _ => WireFormat::Text,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            resume_timeout: std::time::Duration::from_secs(self.resume_timeout_sec),
            history_chunk: self.history_chunk,
            heartbeat_interval: std::time::Duration::from_secs(self.heartbeat_sec),
            live_batch: self.live_batch,
            live_flush: std::time::Duration::from_millis(self.live_flush_ms),
            wire_format: self.wire_format(),
        }
    }
}
