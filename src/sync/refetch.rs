//! Debounced snapshot refetching.

use std::time::Duration;

use tokio::{task::JoinHandle, time::sleep};

/// Default debounce applied between a relay frame and the snapshot fetch it
/// triggers, so a burst of frames costs a single round trip.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Coalesces refetch requests: scheduling again before the delay elapsed
/// replaces the pending fetch instead of stacking another one.
pub struct RefetchScheduler {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl RefetchScheduler {
    /// Scheduler with the default debounce delay.
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_DEBOUNCE)
    }

    /// Scheduler with a custom debounce delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Run `fetch` once the debounce delay elapses, cancelling any fetch that
    /// was still pending.
    pub fn schedule<F, Fut>(&mut self, fetch: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            fetch().await;
        }));
    }

    /// Drop the pending fetch, if any.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Default for RefetchScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RefetchScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use tokio::time::advance;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn a_burst_of_schedules_runs_a_single_fetch() {
        let mut scheduler = RefetchScheduler::with_delay(Duration::from_millis(300));
        let fetches = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fetches = fetches.clone();
            scheduler.schedule(move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
            });
            advance(Duration::from_millis(100)).await;
        }

        advance(Duration::from_millis(400)).await;
        // Let the spawned task run to completion.
        tokio::task::yield_now().await;

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_pending_fetch() {
        let mut scheduler = RefetchScheduler::with_delay(Duration::from_millis(300));
        let fetches = Arc::new(AtomicUsize::new(0));

        {
            let fetches = fetches.clone();
            scheduler.schedule(move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
            });
        }
        scheduler.cancel();

        advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }
}
