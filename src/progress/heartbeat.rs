//! # Lease Heartbeat
//!
//! Runs a unit of work on a background task while the calling task polls
//! it with a bounded timeout, firing one progress broadcast per timeout and
//! one more on completion. The lease stays alive exactly as long as the
//! work does.
//!
//! There is deliberately no cancellation path: work that never completes is
//! polled (and its lease renewed) forever. Forced termination of stuck work
//! is a deployment concern, not handled here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::broadcaster::ProgressBroadcaster;
use crate::worker::errors::{WorkerError, WorkerResult};

/// Bounded-poll wrapper that keeps a lease renewed while work runs
#[derive(Debug, Clone)]
pub struct LeaseHeartbeat {
    frequency: Duration,
}

impl LeaseHeartbeat {
    /// Create a heartbeat firing at the given polling frequency.
    ///
    /// The frequency must be non-zero and should be comfortably shorter
    /// than the lease timeout the broadcaster renews.
    pub fn new(frequency: Duration) -> WorkerResult<Self> {
        if frequency.is_zero() {
            return Err(WorkerError::invalid_argument(
                "heartbeat frequency must be greater than zero",
            ));
        }
        Ok(Self { frequency })
    }

    /// Polling frequency of this heartbeat
    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    /// Run `work` to completion, broadcasting progress on every poll
    /// timeout and once more when the work finishes.
    ///
    /// The work is spawned immediately; the calling task then waits on it
    /// in `frequency`-sized slices. An elapsed slice is internal control
    /// flow, never surfaced to the caller; only the work's own result is.
    /// Broadcast count = timeouts encountered + 1.
    ///
    /// A panic inside the work is resumed on the calling task.
    pub async fn call<T, F>(
        &self,
        broadcaster: Arc<ProgressBroadcaster>,
        work: F,
    ) -> WorkerResult<T>
    where
        T: Send + 'static,
        F: Future<Output = WorkerResult<T>> + Send + 'static,
    {
        let mut handle = tokio::spawn(work);
        let mut timeouts: u64 = 0;

        loop {
            match tokio::time::timeout(self.frequency, &mut handle).await {
                Err(_elapsed) => {
                    timeouts += 1;
                    trace!(timeouts, "Heartbeat interval elapsed; broadcasting progress");
                    broadcaster.fire().await;
                }
                Ok(join_result) => {
                    // Completion broadcast fires before the result (or the
                    // failure) is handed back.
                    broadcaster.fire().await;
                    debug!(timeouts, "Work completed under lease heartbeat");
                    return match join_result {
                        Ok(result) => result,
                        Err(join_error) if join_error.is_panic() => {
                            std::panic::resume_unwind(join_error.into_panic())
                        }
                        Err(_) => Err(WorkerError::fatal("worker task was cancelled")),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::listener::{ProgressError, ProgressListener};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        fires: AtomicUsize,
    }

    impl CountingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fires: AtomicUsize::new(0),
            })
        }

        fn fire_count(&self) -> usize {
            self.fires.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProgressListener for CountingListener {
        fn key(&self) -> &'static str {
            "counting"
        }

        async fn progress_made(&self) -> Result<(), ProgressError> {
            self.fires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn broadcaster_with_counter() -> (Arc<ProgressBroadcaster>, Arc<CountingListener>) {
        let broadcaster = Arc::new(ProgressBroadcaster::new(30));
        let listener = CountingListener::new();
        broadcaster.add_listener(listener.clone()).unwrap();
        (broadcaster, listener)
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let err = LeaseHeartbeat::new(Duration::ZERO).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidArgument { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_timeouts_then_completion() {
        let heartbeat = LeaseHeartbeat::new(Duration::from_millis(1000)).unwrap();
        let (broadcaster, listener) = broadcaster_with_counter();
        let invocations = Arc::new(AtomicUsize::new(0));

        let work_invocations = invocations.clone();
        let result = heartbeat
            .call(broadcaster, async move {
                work_invocations.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2500)).await;
                Ok(101)
            })
            .await
            .unwrap();

        assert_eq!(result, 101);
        // Two elapsed intervals plus the completion broadcast.
        assert_eq!(listener.fire_count(), 3);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_work_fires_once() {
        let heartbeat = LeaseHeartbeat::new(Duration::from_millis(1000)).unwrap();
        let (broadcaster, listener) = broadcaster_with_counter();

        let result = heartbeat
            .call(broadcaster, async move { Ok("done") })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(listener.fire_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_failure_surfaces_unwrapped() {
        let heartbeat = LeaseHeartbeat::new(Duration::from_millis(1000)).unwrap();
        let (broadcaster, listener) = broadcaster_with_counter();

        let err = heartbeat
            .call(broadcaster, async move {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                Err::<(), _>(WorkerError::invalid_argument("changeNumber is required"))
            })
            .await
            .unwrap_err();

        // The work's own classification survives; it is never reshaped
        // into a timeout-looking failure.
        assert!(matches!(err, WorkerError::InvalidArgument { .. }));
        assert!(format!("{err}").contains("changeNumber is required"));
        assert_eq!(listener.fire_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_failure_preserved() {
        let heartbeat = LeaseHeartbeat::new(Duration::from_millis(500)).unwrap();
        let (broadcaster, _listener) = broadcaster_with_counter();

        let err = heartbeat
            .call(broadcaster, async move {
                Err::<(), _>(WorkerError::recoverable("try again later"))
            })
            .await
            .unwrap_err();

        assert!(err.is_recoverable());
    }
}
