//! # Gated Worker Loop
//!
//! The top-level polling loop every worker type runs: check the optional
//! run gate, take a slot on the distributed semaphore, pull exactly one
//! message, and drive the configured runner through the lease heartbeat so
//! both the semaphore lease and the message visibility window stay alive
//! for as long as the work does.
//!
//! Per-cycle state machine:
//!
//! ```text
//! IDLE → GATE_CHECK → LOCK_ATTEMPT → DEQUEUE → DISPATCH → ACK/REQUEUE → RELEASE → IDLE
//!            │              │            │
//!            └─ closed      └─ busy      └─ empty (lease released)
//! ```
//!
//! A closed gate or a fully-held semaphore is a skip, never an error. The
//! semaphore is released on every path out of dispatch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::errors::{WorkerError, WorkerResult};
use super::runner::MessageRunner;
use crate::constants::{
    listener_keys, DEFAULT_RECOVERABLE_RETRY_DELAY_SEC, HEARTBEATS_PER_LEASE,
    MIN_LEASE_TIMEOUT_SEC,
};
use crate::coordination::{RunGate, SemaphoreClient, SemaphoreLease};
use crate::messaging::{QueueClient, QueueMessage, ReceiptHandle};
use crate::progress::{
    LeaseHeartbeat, ProgressBroadcaster, ProgressError, ProgressListener, ProgressSignal,
};

/// Configuration for one gated worker loop instance
#[derive(Debug, Clone)]
pub struct GatedWorkerLoopConfig {
    /// Name of the distributed semaphore guarding this worker type
    pub semaphore_key: String,
    /// Maximum concurrent holders across the whole fleet
    pub max_lock_count: u32,
    /// Lease duration for both the semaphore slot and the message
    /// visibility window
    pub lock_and_visibility_timeout_sec: u64,
    /// Queue this loop consumes
    pub queue_name: String,
    /// Visibility delay applied before redelivering a recoverable failure
    /// that carries no hint of its own
    pub recoverable_retry_delay_sec: u64,
    /// Sleep between cycles when the gate is closed, the lock is busy, or
    /// the queue is empty
    pub idle_backoff: Duration,
}

impl GatedWorkerLoopConfig {
    /// Config with the given key and queue and default lease sizing
    pub fn new(semaphore_key: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            semaphore_key: semaphore_key.into(),
            max_lock_count: 1,
            lock_and_visibility_timeout_sec: MIN_LEASE_TIMEOUT_SEC,
            queue_name: queue_name.into(),
            recoverable_retry_delay_sec: DEFAULT_RECOVERABLE_RETRY_DELAY_SEC,
            idle_backoff: Duration::from_secs(2),
        }
    }

    /// Validate the configuration before the loop is built
    pub fn validate(&self) -> WorkerResult<()> {
        if self.semaphore_key.trim().is_empty() {
            return Err(WorkerError::invalid_argument("semaphore_key is required"));
        }
        if self.queue_name.trim().is_empty() {
            return Err(WorkerError::invalid_argument("queue_name is required"));
        }
        if self.max_lock_count < 1 {
            return Err(WorkerError::invalid_argument(
                "max_lock_count must be greater than or equal to 1",
            ));
        }
        if self.lock_and_visibility_timeout_sec < MIN_LEASE_TIMEOUT_SEC {
            return Err(WorkerError::invalid_argument(format!(
                "lock_and_visibility_timeout_sec must be greater than or equal to {MIN_LEASE_TIMEOUT_SEC} seconds"
            )));
        }
        Ok(())
    }

    /// Heartbeat polling frequency derived from the lease timeout
    pub fn heartbeat_frequency(&self) -> Duration {
        Duration::from_secs(std::cmp::max(
            self.lock_and_visibility_timeout_sec / HEARTBEATS_PER_LEASE,
            1,
        ))
    }
}

/// What a single cycle did, for observability and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The run gate suppressed the cycle
    GateClosed,
    /// All semaphore slots were held elsewhere
    LockBusy,
    /// The lock was taken but the queue had nothing to hand out
    QueueEmpty,
    /// One message processed and deleted
    Completed,
    /// The runner reported a recoverable failure; the message stays for
    /// redelivery
    LeftForRetry,
    /// The runner failed fatally; the message was consumed to keep the
    /// poison out of the limited concurrency slots
    PoisonConsumed,
}

/// Concurrency-gated, lease-renewing worker loop
pub struct GatedWorkerLoop {
    config: GatedWorkerLoopConfig,
    semaphore: Arc<dyn SemaphoreClient>,
    queue: Arc<dyn QueueClient>,
    runner: Arc<dyn MessageRunner>,
    gate: Option<Arc<dyn RunGate>>,
    heartbeat: LeaseHeartbeat,
}

impl GatedWorkerLoop {
    /// Build a loop over the given collaborators.
    ///
    /// Fails with `InvalidArgument` when the configuration does not
    /// validate.
    pub fn new(
        config: GatedWorkerLoopConfig,
        semaphore: Arc<dyn SemaphoreClient>,
        queue: Arc<dyn QueueClient>,
        runner: Arc<dyn MessageRunner>,
    ) -> WorkerResult<Self> {
        config.validate()?;
        let heartbeat = LeaseHeartbeat::new(config.heartbeat_frequency())?;
        Ok(Self {
            config,
            semaphore,
            queue,
            runner,
            gate: None,
            heartbeat,
        })
    }

    /// Attach an optional run gate checked at the top of every cycle
    pub fn with_gate(mut self, gate: Arc<dyn RunGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn config(&self) -> &GatedWorkerLoopConfig {
        &self.config
    }

    /// Execute one full cycle of the state machine
    pub async fn run_cycle(&self) -> WorkerResult<CycleOutcome> {
        if let Some(gate) = &self.gate {
            if !gate.can_run().await {
                debug!(
                    queue_name = %self.config.queue_name,
                    "Run gate closed; skipping cycle"
                );
                return Ok(CycleOutcome::GateClosed);
            }
        }

        let lease = match self
            .semaphore
            .acquire(
                &self.config.semaphore_key,
                self.config.max_lock_count,
                self.config.lock_and_visibility_timeout_sec,
            )
            .await?
        {
            Some(lease) => lease,
            None => {
                debug!(
                    semaphore_key = %self.config.semaphore_key,
                    "Semaphore fully held; skipping cycle"
                );
                return Ok(CycleOutcome::LockBusy);
            }
        };

        let outcome = self.dispatch_under_lease(&lease).await;

        // The slot goes back regardless of how dispatch ended.
        if let Err(release_error) = self.semaphore.release(&lease).await {
            warn!(
                semaphore_key = %self.config.semaphore_key,
                error = %release_error,
                "Failed to release semaphore lease"
            );
        }

        outcome
    }

    /// Loop cycles until `shutdown` flips to true, sleeping through idle
    /// outcomes and transport errors
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            queue_name = %self.config.queue_name,
            semaphore_key = %self.config.semaphore_key,
            "Worker loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.run_cycle().await {
                Ok(outcome) => {
                    debug!(?outcome, "Worker cycle finished");
                    matches!(
                        outcome,
                        CycleOutcome::GateClosed | CycleOutcome::LockBusy | CycleOutcome::QueueEmpty
                    )
                }
                Err(error) => {
                    error!(
                        queue_name = %self.config.queue_name,
                        error = %error,
                        "Worker cycle failed"
                    );
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.idle_backoff) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        info!(queue_name = %self.config.queue_name, "Worker loop stopped");
    }

    async fn dispatch_under_lease(&self, lease: &SemaphoreLease) -> WorkerResult<CycleOutcome> {
        let message = match self
            .queue
            .receive_message(
                &self.config.queue_name,
                self.config.lock_and_visibility_timeout_sec,
            )
            .await?
        {
            Some(message) => message,
            None => return Ok(CycleOutcome::QueueEmpty),
        };

        let broadcaster = Arc::new(ProgressBroadcaster::new(
            self.config.lock_and_visibility_timeout_sec,
        ));
        broadcaster.add_listener(Arc::new(SemaphoreRefreshListener {
            semaphore: Arc::clone(&self.semaphore),
            lease: lease.clone(),
            timeout_sec: self.config.lock_and_visibility_timeout_sec,
        }))?;
        broadcaster.add_listener(Arc::new(VisibilityExtensionListener {
            queue: Arc::clone(&self.queue),
            queue_name: self.config.queue_name.clone(),
            receipt: message.receipt.clone(),
            timeout_sec: self.config.lock_and_visibility_timeout_sec,
        }))?;

        if let Some(aware) = self.runner.as_lock_timeout_aware() {
            aware.set_lock_timeout(Duration::from_secs(
                self.config.lock_and_visibility_timeout_sec,
            ));
        }

        self.dispatch_message(broadcaster, message).await
    }

    async fn dispatch_message(
        &self,
        broadcaster: Arc<ProgressBroadcaster>,
        message: QueueMessage,
    ) -> WorkerResult<CycleOutcome> {
        let runner = Arc::clone(&self.runner);
        let progress: Arc<dyn ProgressSignal> = broadcaster.clone();
        let payload = message.payload.clone();
        let work = async move { runner.run(progress, payload).await };

        match self.heartbeat.call(broadcaster, work).await {
            Ok(()) => {
                self.queue
                    .delete_message(&self.config.queue_name, &message.receipt)
                    .await?;
                Ok(CycleOutcome::Completed)
            }
            Err(error) if error.is_recoverable() => {
                let delay_sec = error
                    .retry_after()
                    .map(|delay| delay.as_secs())
                    .unwrap_or(self.config.recoverable_retry_delay_sec);
                info!(
                    queue_name = %self.config.queue_name,
                    retry_delay_sec = delay_sec,
                    reason = %error,
                    "Recoverable failure; leaving message for redelivery"
                );
                // Shorten the visibility window so redelivery does not wait
                // out the full lease.
                if let Err(visibility_error) = self
                    .queue
                    .extend_visibility(&self.config.queue_name, &message.receipt, delay_sec)
                    .await
                {
                    warn!(
                        queue_name = %self.config.queue_name,
                        error = %visibility_error,
                        "Failed to shorten visibility for retry"
                    );
                }
                Ok(CycleOutcome::LeftForRetry)
            }
            Err(error) => {
                error!(
                    queue_name = %self.config.queue_name,
                    error = %error,
                    "Worker failed; consuming message to avoid a poison loop"
                );
                self.queue
                    .delete_message(&self.config.queue_name, &message.receipt)
                    .await?;
                Ok(CycleOutcome::PoisonConsumed)
            }
        }
    }
}

/// Renews the semaphore lease on every progress signal
struct SemaphoreRefreshListener {
    semaphore: Arc<dyn SemaphoreClient>,
    lease: SemaphoreLease,
    timeout_sec: u64,
}

#[async_trait]
impl ProgressListener for SemaphoreRefreshListener {
    fn key(&self) -> &'static str {
        listener_keys::SEMAPHORE_REFRESH
    }

    async fn progress_made(&self) -> Result<(), ProgressError> {
        self.semaphore
            .refresh(&self.lease, self.timeout_sec)
            .await
            .map_err(|error| ProgressError::renewal_failed(self.key(), error.to_string()))
    }
}

/// Re-arms the message visibility window on every progress signal
struct VisibilityExtensionListener {
    queue: Arc<dyn QueueClient>,
    queue_name: String,
    receipt: ReceiptHandle,
    timeout_sec: u64,
}

#[async_trait]
impl ProgressListener for VisibilityExtensionListener {
    fn key(&self) -> &'static str {
        listener_keys::VISIBILITY_EXTENSION
    }

    async fn progress_made(&self) -> Result<(), ProgressError> {
        self.queue
            .extend_visibility(&self.queue_name, &self.receipt, self.timeout_sec)
            .await
            .map_err(|error| ProgressError::renewal_failed(self.key(), error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryQueue, InMemorySemaphore, ScriptedRunner, StaticGate};
    use serde_json::json;

    fn test_config() -> GatedWorkerLoopConfig {
        GatedWorkerLoopConfig::new("worker-lock", "work-queue")
    }

    fn build_loop(
        semaphore: Arc<InMemorySemaphore>,
        queue: Arc<InMemoryQueue>,
        runner: Arc<ScriptedRunner>,
    ) -> GatedWorkerLoop {
        GatedWorkerLoop::new(test_config(), semaphore, queue, runner).unwrap()
    }

    #[test]
    fn test_config_validation() {
        let mut config = test_config();
        config.semaphore_key = String::new();
        assert!(matches!(
            config.validate().unwrap_err(),
            WorkerError::InvalidArgument { .. }
        ));

        let mut config = test_config();
        config.queue_name = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.max_lock_count = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.lock_and_visibility_timeout_sec = 29;
        let message = format!("{}", config.validate().unwrap_err());
        assert!(message.contains("30"));

        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_heartbeat_frequency_derivation() {
        let mut config = test_config();
        config.lock_and_visibility_timeout_sec = 90;
        assert_eq!(config.heartbeat_frequency(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_gate_closed_skips_before_lock() {
        let semaphore = InMemorySemaphore::new();
        let queue = InMemoryQueue::new();
        let runner = ScriptedRunner::succeeding();
        let worker_loop = build_loop(semaphore.clone(), queue.clone(), runner)
            .with_gate(StaticGate::closed());

        let outcome = worker_loop.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::GateClosed);
        assert_eq!(semaphore.acquire_count(), 0);
    }

    #[tokio::test]
    async fn test_lock_busy_skips_without_receive() {
        let semaphore = InMemorySemaphore::exhausted();
        let queue = InMemoryQueue::new();
        queue.push("work-queue", json!({"unit": 1}));
        let runner = ScriptedRunner::succeeding();
        let worker_loop = build_loop(semaphore.clone(), queue.clone(), runner.clone());

        let outcome = worker_loop.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::LockBusy);
        assert_eq!(queue.receive_count(), 0);
        assert_eq!(runner.run_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_releases_lease() {
        let semaphore = InMemorySemaphore::new();
        let queue = InMemoryQueue::new();
        let runner = ScriptedRunner::succeeding();
        let worker_loop = build_loop(semaphore.clone(), queue, runner);

        let outcome = worker_loop.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::QueueEmpty);
        assert_eq!(semaphore.acquire_count(), 1);
        assert_eq!(semaphore.release_count(), 1);
    }

    #[tokio::test]
    async fn test_success_deletes_and_releases() {
        let semaphore = InMemorySemaphore::new();
        let queue = InMemoryQueue::new();
        queue.push("work-queue", json!({"unit": 1}));
        let runner = ScriptedRunner::succeeding();
        let worker_loop = build_loop(semaphore.clone(), queue.clone(), runner.clone());

        let outcome = worker_loop.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Completed);
        assert_eq!(runner.run_count(), 1);
        assert_eq!(queue.deleted_count("work-queue"), 1);
        assert_eq!(queue.remaining("work-queue"), 0);
        assert_eq!(semaphore.release_count(), 1);
    }

    #[tokio::test]
    async fn test_recoverable_leaves_message_with_short_visibility() {
        let semaphore = InMemorySemaphore::new();
        let queue = InMemoryQueue::new();
        queue.push("work-queue", json!({"unit": 1}));
        let runner = ScriptedRunner::failing_with(|| WorkerError::recoverable("not yet"));
        let worker_loop = build_loop(semaphore.clone(), queue.clone(), runner);

        let outcome = worker_loop.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::LeftForRetry);
        assert_eq!(queue.deleted_count("work-queue"), 0);
        assert_eq!(queue.remaining("work-queue"), 1);
        // Redelivery scheduled at the configured retry delay, not the full
        // lease.
        assert_eq!(
            queue.last_visibility_change("work-queue"),
            Some(DEFAULT_RECOVERABLE_RETRY_DELAY_SEC)
        );
        assert_eq!(semaphore.release_count(), 1);
    }

    #[tokio::test]
    async fn test_recoverable_retry_hint_wins() {
        let semaphore = InMemorySemaphore::new();
        let queue = InMemoryQueue::new();
        queue.push("work-queue", json!({"unit": 1}));
        let runner = ScriptedRunner::failing_with(|| {
            WorkerError::recoverable_after("not yet", Duration::from_secs(17))
        });
        let worker_loop = build_loop(semaphore, queue.clone(), runner);

        worker_loop.run_cycle().await.unwrap();

        assert_eq!(queue.last_visibility_change("work-queue"), Some(17));
    }

    #[tokio::test]
    async fn test_fatal_consumes_message() {
        let semaphore = InMemorySemaphore::new();
        let queue = InMemoryQueue::new();
        queue.push("work-queue", json!({"unit": 1}));
        let runner = ScriptedRunner::failing_with(|| WorkerError::fatal("cannot ever succeed"));
        let worker_loop = build_loop(semaphore.clone(), queue.clone(), runner);

        let outcome = worker_loop.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::PoisonConsumed);
        assert_eq!(queue.deleted_count("work-queue"), 1);
        assert_eq!(queue.remaining("work-queue"), 0);
        assert_eq!(semaphore.release_count(), 1);
    }

    #[tokio::test]
    async fn test_lock_timeout_aware_runner_informed() {
        let semaphore = InMemorySemaphore::new();
        let queue = InMemoryQueue::new();
        queue.push("work-queue", json!({"unit": 1}));
        let runner = ScriptedRunner::succeeding();
        let worker_loop = build_loop(semaphore, queue, runner.clone());

        worker_loop.run_cycle().await.unwrap();

        assert_eq!(
            runner.observed_lock_timeout(),
            Some(Duration::from_secs(MIN_LEASE_TIMEOUT_SEC))
        );
    }

    #[tokio::test]
    async fn test_gate_open_proceeds() {
        let semaphore = InMemorySemaphore::new();
        let queue = InMemoryQueue::new();
        queue.push("work-queue", json!({"unit": 1}));
        let runner = ScriptedRunner::succeeding();
        let worker_loop =
            build_loop(semaphore, queue, runner.clone()).with_gate(StaticGate::open());

        let outcome = worker_loop.run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Completed);
        assert_eq!(runner.run_count(), 1);
    }
}
