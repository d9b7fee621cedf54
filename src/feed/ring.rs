//! The sequenced ring: a bounded, append-only window over a run's samples.
//!
//! Mirrors the reference server's per-run ring (`collections.deque(maxlen=...)`
//! plus a monotonic `next_seq` and per-series counters), adapted to a
//! synchronous `parking_lot` mutex for the bookkeeping and a `tokio::sync`
//! `Notify` for wake-all delivery of "there is new data" to waiting sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::sample::{Sample, SampleInput};

struct RingInner {
    buf: VecDeque<Arc<Sample>>,
    capacity: usize,
    next_seq: u64,
    series_next: HashMap<String, u64>,
}

impl RingInner {
    fn min_seq(&self) -> u64 {
        self.next_seq - self.buf.len() as u64
    }
}

/// A run: the sequenced ring plus its completion state.
///
/// A process hosts at most one active run at a time (see [`crate::feed::RunSlot`]);
/// the run itself is independent of that hosting policy and can be
/// constructed and driven on its own, which is how tests exercise it.
pub struct Run {
    inner: Mutex<RingInner>,
    notify: Notify,
    done: AtomicBool,
    final_seq: AtomicU64,
}

/// Sentinel stored in `final_seq` before a run is marked done. Sequence
/// numbers start at 1, so 0 never collides with a real value.
const NO_FINAL_SEQ: u64 = 0;

impl Run {
    pub fn new(ring_capacity: usize) -> Self {
        assert!(ring_capacity > 0, "ring capacity must be positive");
        Self {
            inner: Mutex::new(RingInner {
                buf: VecDeque::with_capacity(ring_capacity.min(4096)),
                capacity: ring_capacity,
                next_seq: 1,
                series_next: HashMap::new(),
            }),
            notify: Notify::new(),
            done: AtomicBool::new(false),
            final_seq: AtomicU64::new(NO_FINAL_SEQ),
        }
    }

    pub fn ring_capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Appends a sample, assigning it the next global and per-series
    /// sequence numbers, and wakes any session waiting for new data.
    ///
    /// Panics if called after [`Run::mark_done`] — a finished run never
    /// grows again.
    pub fn append(&self, input: SampleInput) -> Arc<Sample> {
        assert!(!self.done.load(Ordering::Acquire), "cannot append to a done run");
        let sample = {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            let series_seq = {
                let counter = inner.series_next.entry(input.series_id.clone()).or_insert(0);
                *counter += 1;
                *counter
            };
            let sample = Arc::new(Sample {
                seq,
                series_seq,
                series_id: input.series_id,
                t_ms: input.t_ms,
                payload: input.payload,
            });
            if inner.buf.len() == inner.capacity {
                inner.buf.pop_front();
            }
            inner.buf.push_back(sample.clone());
            sample
        };
        self.notify.notify_waiters();
        sample
    }

    pub fn min_seq(&self) -> u64 {
        self.inner.lock().min_seq()
    }

    pub fn last_seq(&self) -> u64 {
        let inner = self.inner.lock();
        inner.next_seq - 1
    }

    /// Returns the samples with `lo <= seq <= hi`, clamped to what the ring
    /// currently retains. Empty if the requested range has already fallen
    /// out of the window or lies entirely in the future.
    pub fn get_range(&self, lo: u64, hi: u64) -> Vec<Arc<Sample>> {
        let inner = self.inner.lock();
        let min_seq = inner.min_seq();
        let last_seq = inner.next_seq.saturating_sub(1);
        let lo = lo.max(min_seq);
        let hi = hi.min(last_seq);
        if lo > hi || inner.buf.is_empty() {
            return Vec::new();
        }
        let start = (lo - min_seq) as usize;
        let end = (hi - min_seq) as usize;
        inner.buf.range(start..=end).cloned().collect()
    }

    /// Waits until the run has data past `seq`, or `timeout` elapses.
    /// Returns whether there is now such data. Registers for notification
    /// before checking the condition so an append racing this call is never
    /// missed.
    pub async fn wait_for_new_after(&self, seq: u64, timeout: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        if self.last_seq() > seq || self.is_done() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.last_seq() > seq || self.is_done()
    }

    /// Marks the run as finished: no further samples will be appended and
    /// `final_seq()` is now fixed. Wakes all waiters so sessions blocked in
    /// `wait_for_new_after` can observe completion promptly.
    pub fn mark_done(&self) {
        let last = self.last_seq();
        self.final_seq.store(last, Ordering::Release);
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn final_seq(&self) -> Option<u64> {
        if self.is_done() {
            Some(self.final_seq.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

/// The process-wide handle to the current run. A new run replaces any prior
/// one atomically; sessions hold an `Arc<Run>` clone, so an in-flight session
/// keeps serving its own run to completion even after replacement.
pub struct RunSlot(Mutex<Option<Arc<Run>>>);

impl RunSlot {
    pub fn empty() -> Self {
        Self(Mutex::new(None))
    }

    pub fn new(run: Arc<Run>) -> Self {
        Self(Mutex::new(Some(run)))
    }

    pub fn current(&self) -> Option<Arc<Run>> {
        self.0.lock().clone()
    }

    pub fn replace(&self, run: Arc<Run>) {
        *self.0.lock() = Some(run);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::sample::Payload;

    fn input(series: &str, seq_marker: i64) -> SampleInput {
        SampleInput {
            series_id: series.to_string(),
            t_ms: seq_marker,
            payload: Payload::Scalar { value: Some(seq_marker as f64) },
        }
    }

    #[test]
    fn append_assigns_monotonic_seq_and_series_seq() {
        let run = Run::new(10);
        let a = run.append(input("x", 1));
        let b = run.append(input("x", 2));
        let c = run.append(input("y", 3));
        assert_eq!((a.seq, a.series_seq), (1, 1));
        assert_eq!((b.seq, b.series_seq), (2, 2));
        assert_eq!((c.seq, c.series_seq), (3, 1));
    }

    #[test]
    fn ring_evicts_oldest_once_full() {
        let run = Run::new(3);
        for i in 0..5 {
            run.append(input("x", i));
        }
        assert_eq!(run.min_seq(), 3);
        assert_eq!(run.last_seq(), 5);
        let range = run.get_range(1, 5);
        assert_eq!(range.iter().map(|s| s.seq).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn get_range_clamps_and_handles_future_request() {
        let run = Run::new(3);
        for i in 0..5 {
            run.append(input("x", i));
        }
        assert!(run.get_range(100, 200).is_empty());
        assert_eq!(run.get_range(0, 3).iter().map(|s| s.seq).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn empty_ring_reports_min_seq_equal_next() {
        let run = Run::new(10);
        assert_eq!(run.min_seq(), 1);
        assert_eq!(run.last_seq(), 0);
    }

    #[tokio::test]
    async fn wait_for_new_after_wakes_on_append() {
        let run = Arc::new(Run::new(10));
        let waiter = {
            let run = run.clone();
            tokio::spawn(async move { run.wait_for_new_after(0, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        run.append(input("x", 1));
        let woke = waiter.await.unwrap();
        assert!(woke);
    }

    #[tokio::test]
    async fn wait_for_new_after_times_out_without_data() {
        let run = Run::new(10);
        let woke = run.wait_for_new_after(0, Duration::from_millis(30)).await;
        assert!(!woke);
    }

    #[tokio::test]
    async fn wait_for_new_after_wakes_on_mark_done() {
        let run = Arc::new(Run::new(10));
        let waiter = {
            let run = run.clone();
            tokio::spawn(async move { run.wait_for_new_after(0, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        run.mark_done();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn run_slot_replace_is_atomic_and_visible() {
        let slot = RunSlot::empty();
        assert!(slot.current().is_none());
        let run = Arc::new(Run::new(5));
        slot.replace(run.clone());
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &run));
        let run2 = Arc::new(Run::new(5));
        slot.replace(run2.clone());
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &run2));
    }
}
