//! The live sender loop: streams new samples as they land in the ring.
//!
//! Grounded in the reference server's `_live_loop` — global `seq` is
//! monotonic and, absent ring truncation, contiguous; gaps are logged, never
//! hidden from the operator, but never surfaced to the client as a distinct
//! wire message. Per-series `series_seq` gap/duplicate tracking is pure
//! observability: it never mutates delivery.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use serde_json::json;
use tracing::warn;

use super::ring::Run;
use super::session::{send_data, SessionConfig};
use super::wire::DataFrameKind;

struct SeriesGapState {
    prev: Option<u64>,
    gaps: u64,
    missed: u64,
    warned_initial: bool,
}

impl SeriesGapState {
    fn new() -> Self {
        Self { prev: None, gaps: 0, missed: 0, warned_initial: false }
    }

    /// Records a new `series_seq` observation, logging (but never acting
    /// on) a detected gap or duplicate/out-of-order arrival.
    fn observe(&mut self, series_id: &str, series_seq: u64) {
        match self.prev {
            None => {
                self.prev = Some(series_seq);
                if series_seq > 1 && !self.warned_initial {
                    let missed = series_seq - 1;
                    self.gaps += 1;
                    self.missed += missed;
                    warn!(series_id, series_seq, missed, "initial series gap: earlier samples not seen by this session");
                    self.warned_initial = true;
                }
            }
            Some(prev) => {
                if series_seq > prev + 1 {
                    let gap = series_seq - prev - 1;
                    self.gaps += 1;
                    self.missed += gap;
                    warn!(series_id, prev_series_seq = prev, series_seq, gap, "series gap detected");
                } else if series_seq <= prev {
                    warn!(series_id, prev_series_seq = prev, series_seq, "duplicate or out-of-order series_seq");
                }
                self.prev = Some(series_seq);
            }
        }
    }
}

pub async fn live_loop(
    sink: Arc<tokio::sync::Mutex<SplitSink<WebSocket, Message>>>,
    run: Arc<Run>,
    after_seq: u64,
    cfg: SessionConfig,
) {
    assert!(cfg.live_batch > 0, "live_batch must be positive");
    let mut last_sent = after_seq;
    let mut series_state: HashMap<String, SeriesGapState> = HashMap::new();

    loop {
        if run.is_done() {
            let final_seq = run.final_seq().unwrap_or(last_sent);
            if last_sent >= final_seq {
                let mut sink = sink.lock().await;
                let _ = futures_util::SinkExt::send(
                    &mut *sink,
                    Message::Text(json!({"type": "test_done", "final_seq": final_seq}).to_string()),
                )
                .await;
                return;
            }
        }

        if run.last_seq() <= last_sent {
            run.wait_for_new_after(last_sent, std::time::Duration::from_secs(1)).await;
            continue;
        }

        let end = run.last_seq();
        let expected_start = last_sent + 1;
        let to_send = run.get_range(expected_start, end);

        if let Some(first) = to_send.first() {
            if first.seq > expected_start {
                let skipped = first.seq - expected_start;
                warn!(expected = expected_start, got = first.seq, skipped, "global seq gap: ring likely truncated");
            }
        }

        for batch in to_send.chunks(cfg.live_batch) {
            for s in batch {
                series_state.entry(s.series_id.clone()).or_insert_with(SeriesGapState::new).observe(&s.series_id, s.series_seq);
            }
            let mut sink_guard = sink.lock().await;
            let ok = send_data(&mut sink_guard, cfg.wire_format, DataFrameKind::Live, batch).await;
            drop(sink_guard);
            if !ok {
                return;
            }
            last_sent = batch.last().map(|s| s.seq).unwrap_or(last_sent);
            tokio::time::sleep(cfg.live_flush).await;
        }
    }
}
