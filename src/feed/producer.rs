//! The producer contract: anything that can feed samples into a run.
//!
//! Concrete producers (a synthetic generator, a database tailer) live
//! outside the core feed engine — this trait is the seam between them and
//! the ring, the same role `async_trait`-based adapter traits play
//! elsewhere in this codebase.

use std::sync::Arc;

use async_trait::async_trait;

use super::ring::Run;

/// A source of samples for a run. `run()` drives the producer to
/// completion (or forever, for an unbounded live source) and is
/// responsible for calling [`Run::mark_done`] when it has nothing more to
/// append.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn run(self: Arc<Self>, run: Arc<Run>) -> anyhow::Result<()>;
}
