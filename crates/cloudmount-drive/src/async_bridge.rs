//! Bridge between synchronous driver callbacks and async provider calls.
//!
//! Driver worker threads are plain OS threads. Provider calls such as
//! directory listings are async, so a callback spawns the future on the
//! drive's tokio runtime and parks on a oneshot until the future finishes or
//! the provider timeout elapses.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::trace;

/// Counters for provider calls made through [`block_on_provider`].
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub operations_started: AtomicU64,
    pub operations_completed: AtomicU64,
    pub operations_timed_out: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Calls that have neither returned nor timed out.
    pub fn in_flight(&self) -> u64 {
        let started = self.operations_started.load(Ordering::Relaxed);
        let finished = self.operations_completed.load(Ordering::Relaxed)
            + self.operations_timed_out.load(Ordering::Relaxed);
        started.saturating_sub(finished)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// The runtime dropped the task before it reported back.
    #[error("provider call was cancelled")]
    Cancelled,

    /// Parking a runtime worker on its own runtime would deadlock.
    #[error("cannot wait on a provider call from inside the async runtime")]
    InsideRuntime,
}

impl BridgeError {
    pub fn to_errno(&self) -> i32 {
        match self {
            BridgeError::Timeout(_) => libc::ETIMEDOUT,
            BridgeError::Cancelled => libc::ECANCELED,
            BridgeError::InsideRuntime => libc::EDEADLK,
        }
    }
}

/// Run `future` on `runtime` and wait for it from the calling thread.
///
/// A call that outlives `timeout` is aborted on the runtime, so a hung
/// listing does not keep a provider connection busy after the callback
/// has already answered.
pub fn block_on_provider<F, T>(
    runtime: &Handle,
    timeout: Duration,
    stats: &BridgeStats,
    future: F,
) -> Result<T, BridgeError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    if Handle::try_current().is_ok() {
        return Err(BridgeError::InsideRuntime);
    }

    BridgeStats::bump(&stats.operations_started);
    let (reply, waiter) = oneshot::channel();
    let task = runtime.spawn(async move {
        let outcome = tokio::time::timeout(timeout, future).await;
        let _ = reply.send(outcome);
    });

    let Ok(outcome) = waiter.blocking_recv() else {
        task.abort();
        return Err(BridgeError::Cancelled);
    };
    match outcome {
        Ok(value) => {
            BridgeStats::bump(&stats.operations_completed);
            Ok(value)
        }
        Err(_) => {
            task.abort();
            BridgeStats::bump(&stats.operations_timed_out);
            trace!(?timeout, "Provider call abandoned");
            Err(BridgeError::Timeout(timeout))
        }
    }
}
