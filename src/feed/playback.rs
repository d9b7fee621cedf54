//! The playback driver: replays a finite, pre-built sample set into a run.
//!
//! Grounded in the reference server's `playback_from_memory`: unpaced
//! playback appends in batches with a cooperative yield between them; paced
//! playback accumulates fractional "credit" each tick and emits whole
//! samples as the credit clears, so the achieved rate tracks `emit_sps` over
//! time instead of rounding every tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use super::ring::Run;
use super::sample::SampleInput;

const MIN_SLEEP: Duration = Duration::from_millis(1);

/// Replays `samples` into `run` at approximately `emit_sps` samples/sec.
/// `emit_sps <= 0.0` means unpaced: as fast as possible, cooperatively
/// yielding between batches. Always marks `run` done on exit, even for an
/// empty sample set.
pub async fn playback_from_memory(run: &Arc<Run>, samples: Vec<SampleInput>, emit_sps: f64, label: &str, live_batch: usize) {
    assert!(live_batch > 0, "live_batch must be positive");
    let n = samples.len();
    if n == 0 {
        run.mark_done();
        info!(label, "playback: nothing to play (0 samples)");
        return;
    }

    info!(label, samples = n, emit_sps = if emit_sps > 0.0 { emit_sps } else { f64::NAN }, "starting playback");

    let mut samples = samples.into_iter();
    if emit_sps <= 0.0 {
        let batch_size = live_batch.saturating_mul(4);
        loop {
            let mut emitted = 0;
            for input in samples.by_ref().take(batch_size) {
                run.append(input);
                emitted += 1;
            }
            if emitted == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
    } else {
        let mut last_wall = Instant::now();
        let mut carry = 0.0_f64;
        let mut samples = samples.peekable();
        while samples.peek().is_some() {
            let now = Instant::now();
            let dt = (now - last_wall).as_secs_f64();
            last_wall = now;
            carry += emit_sps * dt;
            let to_emit = carry as u64;
            if to_emit == 0 {
                tokio::time::sleep(MIN_SLEEP).await;
                continue;
            }
            carry -= to_emit as f64;
            for _ in 0..to_emit {
                match samples.next() {
                    Some(input) => {
                        run.append(input);
                    }
                    None => break,
                }
            }
            tokio::time::sleep(MIN_SLEEP).await;
        }
    }

    run.mark_done();
    info!(label, final_seq = run.final_seq(), sent_samples = n, "playback done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::sample::Payload;

    fn samples(n: usize) -> Vec<SampleInput> {
        (0..n)
            .map(|i| SampleInput {
                series_id: "x:ticks".to_string(),
                t_ms: i as i64,
                payload: Payload::Tick { price: i as f64, volume: 1.0 },
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_playback_marks_done_immediately() {
        let run = Arc::new(Run::new(10));
        playback_from_memory(&run, Vec::new(), 0.0, "t", 8).await;
        assert!(run.is_done());
        assert_eq!(run.final_seq(), Some(0));
    }

    #[tokio::test]
    async fn unpaced_playback_appends_all_and_marks_done() {
        let run = Arc::new(Run::new(100));
        playback_from_memory(&run, samples(37), 0.0, "t", 8).await;
        assert!(run.is_done());
        assert_eq!(run.last_seq(), 37);
        assert_eq!(run.final_seq(), Some(37));
    }

    #[tokio::test]
    async fn paced_playback_appends_all_and_marks_done() {
        let run = Arc::new(Run::new(100));
        playback_from_memory(&run, samples(20), 5000.0, "t", 8).await;
        assert!(run.is_done());
        assert_eq!(run.last_seq(), 20);
    }
}
