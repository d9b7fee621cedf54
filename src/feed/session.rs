//! The per-connection session state machine.
//!
//! `AWAIT_RESUME -> SENDING_HISTORY -> SENDING_DELTA -> LIVE -> SENT_TEST_DONE -> CLOSED`,
//! grounded directly in the reference server's `WSServer.handler` (resume,
//! `init_begin`, chunked history/delta, `init_complete`, then heartbeat and
//! live tasks raced to completion) and adapted to axum's split websocket and
//! `tokio::select!` in place of `asyncio.wait(FIRST_COMPLETED)`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, info_span, Instrument};

use super::live::live_loop;
use super::ring::{Run, RunSlot};
use super::wire::{data_frame_json, encode_samples_binary, DataFrameKind, WireFormat};

/// Static, server-wide session parameters. Wire format and batching are
/// process configuration, not negotiated per connection — the reference
/// server picks them once from its CLI args too.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub resume_timeout: Duration,
    pub history_chunk: usize,
    pub heartbeat_interval: Duration,
    pub live_batch: usize,
    pub live_flush: Duration,
    pub wire_format: WireFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_timeout: Duration::from_secs(15),
            history_chunk: 4096,
            heartbeat_interval: Duration::from_secs(5),
            live_batch: 512,
            live_flush: Duration::from_millis(20),
            wire_format: WireFormat::Text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    #[serde(rename = "type")]
    kind: String,
    from_seq: Option<u64>,
}

/// Sends a control frame. Returns whether the send succeeded — a transport
/// failure here means the session must terminate (SPEC_FULL.md §5).
async fn send_control(sink: &mut SplitSink<WebSocket, Message>, value: Value) -> bool {
    sink.send(Message::Text(value.to_string())).await.is_ok()
}

/// Sends a data frame, skipping an empty batch entirely — there is nothing
/// for the client to do with a frame that carries no samples. Returns
/// whether the send succeeded (an empty batch counts as success: there was
/// nothing to fail).
pub(super) async fn send_data(
    sink: &mut SplitSink<WebSocket, Message>,
    format: WireFormat,
    kind: DataFrameKind,
    samples: &[Arc<super::sample::Sample>],
) -> bool {
    if samples.is_empty() {
        return true;
    }
    match format {
        WireFormat::Text => sink.send(Message::Text(data_frame_json(kind, samples).to_string())).await.is_ok(),
        WireFormat::Binary => {
            let buf = encode_samples_binary(kind, samples);
            if buf.is_empty() {
                true
            } else {
                sink.send(Message::Binary(buf)).await.is_ok()
            }
        }
    }
}

/// Splits `samples` into chunks of at most `size`. `size` must be positive —
/// `FeedConfig::validate` rejects a non-positive `history_chunk` at startup.
fn chunks(samples: Vec<Arc<super::sample::Sample>>, size: usize) -> Vec<Vec<Arc<super::sample::Sample>>> {
    assert!(size > 0, "chunk size must be positive");
    samples.chunks(size).map(|c| c.to_vec()).collect()
}

/// Drives one client connection end to end. Never returns an error: every
/// failure path (bad first frame, timeout, no active run) is a protocol
/// error frame followed by a clean close, matching the reference handler's
/// best-effort `try/except` shell.
pub async fn run_session(socket: WebSocket, run_slot: Arc<RunSlot>, cfg: SessionConfig, peer: String) {
    let span = info_span!("feed_session", peer = %peer);
    async move {
        let (mut sink, mut stream) = futures_util::StreamExt::split(socket);

        let raw = match tokio::time::timeout(cfg.resume_timeout, futures_util::StreamExt::next(&mut stream)).await {
            Ok(Some(Ok(Message::Text(t)))) => t,
            Ok(Some(Ok(Message::Binary(b)))) => String::from_utf8_lossy(&b).into_owned(),
            Ok(Some(Ok(_))) | Ok(None) => {
                let _ = send_control(&mut sink, json!({"type": "error", "reason": "first frame must be resume"})).await;
                let _ = sink.close().await;
                return;
            }
            Ok(Some(Err(_))) => return,
            Err(_) => {
                let _ = send_control(
                    &mut sink,
                    json!({"type": "error", "reason": "first frame must be resume (timeout)"}),
                )
                .await;
                let _ = sink.close().await;
                return;
            }
        };

        let resume: ResumeRequest = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(_) => {
                let _ = send_control(&mut sink, json!({"type": "error", "reason": "invalid JSON for first frame"})).await;
                let _ = sink.close().await;
                return;
            }
        };
        if resume.kind != "resume" {
            let _ = send_control(&mut sink, json!({"type": "error", "reason": "first frame must be resume"})).await;
            let _ = sink.close().await;
            return;
        }
        let from_seq = resume.from_seq.unwrap_or(1).max(1);

        let run: Arc<Run> = match run_slot.current() {
            Some(run) => run,
            None => {
                let _ = send_control(&mut sink, json!({"type": "error", "reason": "no active run"})).await;
                let _ = sink.close().await;
                return;
            }
        };

        let min_seq = run.min_seq();
        let wm_seq = run.last_seq();
        let start = from_seq.max(min_seq);
        let resume_truncated = from_seq < min_seq;

        if !send_control(
            &mut sink,
            json!({
                "type": "init_begin",
                "wm_seq": wm_seq,
                "min_seq": min_seq,
                "ring_capacity": run.ring_capacity(),
            }),
        )
        .await
        {
            return;
        }

        if start <= wm_seq {
            let history = run.get_range(start, wm_seq);
            for batch in chunks(history, cfg.history_chunk) {
                if !send_data(&mut sink, cfg.wire_format, DataFrameKind::History, &batch).await {
                    return;
                }
            }
        }

        let delta_end = run.last_seq();
        if delta_end > wm_seq {
            let delta = run.get_range(wm_seq + 1, delta_end);
            for batch in chunks(delta, cfg.history_chunk) {
                if !send_data(&mut sink, cfg.wire_format, DataFrameKind::Delta, &batch).await {
                    return;
                }
            }
        }

        if !send_control(
            &mut sink,
            json!({"type": "init_complete", "resume_from": delta_end, "resume_truncated": resume_truncated}),
        )
        .await
        {
            return;
        }

        info!(from_seq, start, delta_end, resume_truncated, "session entering live phase");

        let heartbeat_interval = cfg.heartbeat_interval;
        let sink = Arc::new(tokio::sync::Mutex::new(sink));

        let hb_sink = sink.clone();
        let heartbeat = tokio::spawn(async move {
            loop {
                tokio::time::sleep(heartbeat_interval).await;
                let mut sink = hb_sink.lock().await;
                let ok = send_control(&mut sink, json!({"type": "heartbeat", "ts_ms": chrono::Utc::now().timestamp_millis()}))
                    .await;
                if !ok {
                    return;
                }
            }
        });

        let live_sink = sink.clone();
        let live_run = run.clone();
        let live_cfg = cfg.clone();
        let mut live = tokio::spawn(async move {
            live_loop(live_sink, live_run, delta_end, live_cfg).await;
        });
        let mut heartbeat = heartbeat;

        // Race the two tasks; whichever finishes first (heartbeat never
        // does on its own, live finishes on test_done or a send error)
        // causes the other to be aborted, mirroring
        // asyncio.wait(FIRST_COMPLETED) + cancel-the-rest.
        tokio::select! {
            _ = &mut heartbeat => { live.abort(); }
            _ = &mut live => { heartbeat.abort(); }
        }

        let mut sink = sink.lock().await;
        let _ = sink.close().await;
    }
    .instrument(span)
    .await;
}
