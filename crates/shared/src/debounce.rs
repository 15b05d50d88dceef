//! Per-key write debouncer.
//!
//! Each `schedule` call cancels any *pending* invocation and arms a new one
//! `delay` later, so a burst of calls collapses into the single trailing one.
//! A run that has already fired claims its slot first; re-arming never aborts
//! work that is in flight.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A single-slot trailing-edge debouncer.
///
/// Thread-safe; the caller keeps one instance per debounced key (the indexer
/// keeps one per file path).
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Arc<Mutex<PendingRun>>,
}

#[derive(Debug, Default)]
struct PendingRun {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

fn lock(pending: &Mutex<PendingRun>) -> MutexGuard<'_, PendingRun> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Debouncer {
    /// Create a debouncer with the given trailing delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(PendingRun::default())),
        }
    }

    /// Schedule `work` to run `delay` from now, cancelling any pending run.
    ///
    /// A run whose delay already elapsed takes itself out of the slot before
    /// starting `work`, so only runs that have not fired can be superseded.
    pub fn schedule<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let claim = Arc::clone(&self.pending);
        let previous = {
            let mut pending = lock(&self.pending);
            pending.generation += 1;
            let generation = pending.generation;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                {
                    let mut pending = lock(&claim);
                    if pending.generation != generation {
                        return;
                    }
                    pending.handle = None;
                }
                work.await;
            });
            pending.handle.replace(handle)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Cancel any pending run without scheduling a new one.
    pub fn cancel(&self) {
        let previous = {
            let mut pending = lock(&self.pending);
            pending.generation += 1;
            pending.handle.take()
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// True while a scheduled run has neither fired nor been cancelled.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        lock(&self.pending).handle.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    #[tokio::test]
    async fn burst_collapses_to_one_invocation() {
        let debouncer = Debouncer::new(Duration::from_millis(30));
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..10 {
            let calls = Arc::clone(&calls);
            debouncer.schedule(async move {
                calls.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_drops_pending_work() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        debouncer.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn separate_debouncers_fire_independently() {
        let first = Debouncer::new(Duration::from_millis(10));
        let second = Debouncer::new(Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));

        for debouncer in [&first, &second] {
            let calls = Arc::clone(&calls);
            debouncer.schedule(async move {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rearm_does_not_abort_work_already_running() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        let started = Arc::new(Notify::new());
        let finished = Arc::new(AtomicU32::new(0));

        let signal = Arc::clone(&started);
        let first = Arc::clone(&finished);
        debouncer.schedule(async move {
            signal.notify_one();
            tokio::time::sleep(Duration::from_millis(60)).await;
            first.fetch_add(1, Ordering::SeqCst);
        });

        started.notified().await;
        let second = Arc::clone(&finished);
        debouncer.schedule(async move {
            second.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Both the in-flight run and the trailing re-arm complete.
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fired_run_clears_the_pending_slot() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.schedule(async {});
        assert!(debouncer.has_pending());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!debouncer.has_pending());
    }
}
