//! # Testing Support
//!
//! In-memory, call-recording implementations of the external collaborator
//! seams. These exist for this crate's own tests and for downstream crates
//! that want to exercise worker wiring without a broker, a coordination
//! service, or a query backend.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::coordination::{
    CoordinationError, CoordinationResult, RunGate, SemaphoreClient, SemaphoreLease,
};
use crate::messaging::{
    MessagingError, MessagingResult, QueueClient, QueueMessage, ReceiptHandle,
};
use crate::progress::ProgressSignal;
use crate::query::{ExecutionStatus, QueryProvider, QueryProviderError, ResultPage};
use crate::worker::errors::{WorkerError, WorkerResult};
use crate::worker::runner::{LockTimeoutAware, MessageRunner};

#[derive(Default)]
struct QueueState {
    available: VecDeque<(i64, serde_json::Value)>,
    in_flight: HashMap<String, (i64, serde_json::Value)>,
    deleted: usize,
    sent: Vec<serde_json::Value>,
    last_visibility: Option<u64>,
}

/// In-memory queue transport recording every interaction
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    receive_calls: AtomicUsize,
    next_id: AtomicI64,
}

impl InMemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queues: Mutex::new(HashMap::new()),
            receive_calls: AtomicUsize::new(0),
            next_id: AtomicI64::new(1),
        })
    }

    /// Enqueue a payload directly, bypassing the send log
    pub fn push(&self, queue_name: &str, payload: serde_json::Value) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.queues
            .lock()
            .entry(queue_name.to_string())
            .or_default()
            .available
            .push_back((id, payload));
    }

    /// Put every in-flight message back at the front of the queue, as a
    /// lapsed visibility window would
    pub fn requeue_in_flight(&self, queue_name: &str) {
        let mut queues = self.queues.lock();
        if let Some(state) = queues.get_mut(queue_name) {
            let mut entries: Vec<(i64, serde_json::Value)> =
                state.in_flight.drain().map(|(_, entry)| entry).collect();
            entries.sort_by_key(|(id, _)| *id);
            for entry in entries.into_iter().rev() {
                state.available.push_front(entry);
            }
        }
    }

    /// Total `receive_message` invocations
    pub fn receive_count(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    /// Messages acknowledged and removed
    pub fn deleted_count(&self, queue_name: &str) -> usize {
        self.queues
            .lock()
            .get(queue_name)
            .map(|state| state.deleted)
            .unwrap_or(0)
    }

    /// Messages still alive (available or in flight)
    pub fn remaining(&self, queue_name: &str) -> usize {
        self.queues
            .lock()
            .get(queue_name)
            .map(|state| state.available.len() + state.in_flight.len())
            .unwrap_or(0)
    }

    /// Payloads published through `send_json`, oldest first
    pub fn sent_messages(&self, queue_name: &str) -> Vec<serde_json::Value> {
        self.queues
            .lock()
            .get(queue_name)
            .map(|state| state.sent.clone())
            .unwrap_or_default()
    }

    /// Most recent visibility value applied to any in-flight message
    pub fn last_visibility_change(&self, queue_name: &str) -> Option<u64> {
        self.queues
            .lock()
            .get(queue_name)
            .and_then(|state| state.last_visibility)
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive_message(
        &self,
        queue_name: &str,
        _visibility_timeout_sec: u64,
    ) -> MessagingResult<Option<QueueMessage>> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let mut queues = self.queues.lock();
        let state = queues.entry(queue_name.to_string()).or_default();
        match state.available.pop_front() {
            Some((id, payload)) => {
                let receipt = format!("receipt-{id}");
                state.in_flight.insert(receipt.clone(), (id, payload.clone()));
                Ok(Some(QueueMessage {
                    payload,
                    receipt: ReceiptHandle::new(receipt),
                }))
            }
            None => Ok(None),
        }
    }

    async fn send_json(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
    ) -> MessagingResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut queues = self.queues.lock();
        let state = queues.entry(queue_name.to_string()).or_default();
        state.sent.push(payload.clone());
        state.available.push_back((id, payload.clone()));
        Ok(id)
    }

    async fn delete_message(
        &self,
        queue_name: &str,
        receipt: &ReceiptHandle,
    ) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        let state = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        state
            .in_flight
            .remove(receipt.as_str())
            .ok_or_else(|| MessagingError::invalid_receipt(receipt.as_str()))?;
        state.deleted += 1;
        Ok(())
    }

    async fn extend_visibility(
        &self,
        queue_name: &str,
        receipt: &ReceiptHandle,
        visibility_timeout_sec: u64,
    ) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        let state = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        if !state.in_flight.contains_key(receipt.as_str()) {
            return Err(MessagingError::invalid_receipt(receipt.as_str()));
        }
        state.last_visibility = Some(visibility_timeout_sec);
        Ok(())
    }
}

#[derive(Default)]
struct SemaphoreState {
    holders: HashMap<String, usize>,
    next_token: u64,
}

/// In-memory counting semaphore honoring max-holder counts
pub struct InMemorySemaphore {
    state: Mutex<SemaphoreState>,
    exhausted: bool,
    acquire_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl InMemorySemaphore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SemaphoreState::default()),
            exhausted: false,
            acquire_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        })
    }

    /// A semaphore whose slots are all held elsewhere; every acquire skips
    pub fn exhausted() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SemaphoreState::default()),
            exhausted: true,
            acquire_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        })
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Currently held slots under `key`
    pub fn holders(&self, key: &str) -> usize {
        self.state.lock().holders.get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SemaphoreClient for InMemorySemaphore {
    async fn acquire(
        &self,
        key: &str,
        max_holders: u32,
        _timeout_sec: u64,
    ) -> CoordinationResult<Option<SemaphoreLease>> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.exhausted {
            return Ok(None);
        }
        let mut state = self.state.lock();
        let held = state.holders.get(key).copied().unwrap_or(0);
        if held >= max_holders as usize {
            return Ok(None);
        }
        *state.holders.entry(key.to_string()).or_insert(0) += 1;
        state.next_token += 1;
        Ok(Some(SemaphoreLease::new(
            key,
            format!("token-{}", state.next_token),
        )))
    }

    async fn refresh(&self, lease: &SemaphoreLease, _timeout_sec: u64) -> CoordinationResult<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().holders.get(&lease.key).copied().unwrap_or(0) == 0 {
            return Err(CoordinationError::lease_expired(&lease.key, &lease.token));
        }
        Ok(())
    }

    async fn release(&self, lease: &SemaphoreLease) -> CoordinationResult<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        match state.holders.get_mut(&lease.key) {
            Some(held) if *held > 0 => {
                *held -= 1;
                Ok(())
            }
            _ => Err(CoordinationError::lease_expired(&lease.key, &lease.token)),
        }
    }
}

/// Gate pinned open or closed
pub struct StaticGate {
    open: bool,
}

impl StaticGate {
    pub fn open() -> Arc<Self> {
        Arc::new(Self { open: true })
    }

    pub fn closed() -> Arc<Self> {
        Arc::new(Self { open: false })
    }
}

#[async_trait]
impl RunGate for StaticGate {
    async fn can_run(&self) -> bool {
        self.open
    }
}

type FailureFactory = Box<dyn Fn() -> WorkerError + Send + Sync>;

/// Runner scripted to succeed, fail, or fail on one specific payload
pub struct ScriptedRunner {
    failure: Option<FailureFactory>,
    fail_only_on: Option<serde_json::Value>,
    delay: Option<Duration>,
    payloads: Mutex<Vec<serde_json::Value>>,
    lock_timeout: Mutex<Option<Duration>>,
}

impl ScriptedRunner {
    /// Succeeds on every payload
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            failure: None,
            fail_only_on: None,
            delay: None,
            payloads: Mutex::new(Vec::new()),
            lock_timeout: Mutex::new(None),
        })
    }

    /// Fails on every payload with the factory's error
    pub fn failing_with(factory: impl Fn() -> WorkerError + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(Box::new(factory)),
            fail_only_on: None,
            delay: None,
            payloads: Mutex::new(Vec::new()),
            lock_timeout: Mutex::new(None),
        })
    }

    /// Fails only when the payload equals `target`
    pub fn failing_on(
        target: serde_json::Value,
        factory: impl Fn() -> WorkerError + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(Box::new(factory)),
            fail_only_on: Some(target),
            delay: None,
            payloads: Mutex::new(Vec::new()),
            lock_timeout: Mutex::new(None),
        })
    }

    /// Succeeds after sleeping, to exercise heartbeat renewals
    pub fn delayed(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failure: None,
            fail_only_on: None,
            delay: Some(delay),
            payloads: Mutex::new(Vec::new()),
            lock_timeout: Mutex::new(None),
        })
    }

    pub fn run_count(&self) -> usize {
        self.payloads.lock().len()
    }

    /// Payloads seen, in processing order
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.payloads.lock().clone()
    }

    /// Lock timeout the loop announced, when it did
    pub fn observed_lock_timeout(&self) -> Option<Duration> {
        *self.lock_timeout.lock()
    }
}

#[async_trait]
impl MessageRunner for ScriptedRunner {
    async fn run(
        &self,
        _progress: Arc<dyn ProgressSignal>,
        payload: serde_json::Value,
    ) -> WorkerResult<()> {
        self.payloads.lock().push(payload.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(factory) = &self.failure {
            let applies = self
                .fail_only_on
                .as_ref()
                .map(|target| *target == payload)
                .unwrap_or(true);
            if applies {
                return Err(factory());
            }
        }
        Ok(())
    }

    fn as_lock_timeout_aware(&self) -> Option<&dyn LockTimeoutAware> {
        Some(self)
    }
}

impl LockTimeoutAware for ScriptedRunner {
    fn set_lock_timeout(&self, timeout: Duration) {
        *self.lock_timeout.lock() = Some(timeout);
    }
}

/// Progress signal that ignores every fire
pub struct NullProgress;

impl NullProgress {
    pub fn handle() -> Arc<dyn ProgressSignal> {
        Arc::new(Self)
    }
}

#[async_trait]
impl ProgressSignal for NullProgress {
    async fn fire(&self) {}
}

/// Progress signal counting fires
pub struct RecordingSignal {
    fires: AtomicUsize,
}

impl RecordingSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fires: AtomicUsize::new(0),
        })
    }

    pub fn fire_count(&self) -> usize {
        self.fires.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressSignal for RecordingSignal {
    async fn fire(&self) {
        self.fires.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ProviderState {
    pages: Vec<ResultPage>,
    fetch_cursor: usize,
    observed_tokens: Vec<Option<String>>,
}

/// Query provider serving a fixed status and a scripted page sequence
pub struct StaticQueryProvider {
    status: ExecutionStatus,
    state: Mutex<ProviderState>,
}

impl StaticQueryProvider {
    pub fn with_status(status: ExecutionStatus) -> Arc<Self> {
        Arc::new(Self {
            status,
            state: Mutex::new(ProviderState::default()),
        })
    }

    /// Append a page to the scripted sequence
    pub fn add_page(self: Arc<Self>, page: ResultPage) -> Arc<Self> {
        self.state.lock().pages.push(page);
        self
    }

    pub fn page_fetch_count(&self) -> usize {
        self.state.lock().observed_tokens.len()
    }

    /// Page tokens seen by `results_page`, in call order
    pub fn observed_tokens(&self) -> Vec<Option<String>> {
        self.state.lock().observed_tokens.clone()
    }
}

#[async_trait]
impl QueryProvider for StaticQueryProvider {
    async fn execution_status(
        &self,
        _execution_id: &str,
    ) -> Result<ExecutionStatus, QueryProviderError> {
        Ok(self.status.clone())
    }

    async fn results_page(
        &self,
        _execution_id: &str,
        page_token: Option<&str>,
        _max_rows: u32,
    ) -> Result<ResultPage, QueryProviderError> {
        let mut state = self.state.lock();
        state
            .observed_tokens
            .push(page_token.map(|token| token.to_string()));
        let page = state
            .pages
            .get(state.fetch_cursor)
            .cloned()
            .unwrap_or(ResultPage {
                rows: vec![],
                next_token: None,
            });
        state.fetch_cursor += 1;
        Ok(page)
    }
}

/// Results processor recording every page it is handed
pub struct RecordingProcessor {
    pages: Mutex<Vec<(String, Vec<serde_json::Value>)>>,
}

impl RecordingProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(Vec::new()),
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }

    /// All rows seen, flattened in arrival order
    pub fn rows(&self) -> Vec<serde_json::Value> {
        self.pages
            .lock()
            .iter()
            .flat_map(|(_, rows)| rows.clone())
            .collect()
    }

    /// Invocation ids seen, one per page
    pub fn invocation_ids(&self) -> Vec<String> {
        self.pages
            .lock()
            .iter()
            .map(|(invocation_id, _)| invocation_id.clone())
            .collect()
    }
}

#[async_trait]
impl crate::query::ResultPageProcessor for RecordingProcessor {
    async fn process_rows(
        &self,
        invocation_id: &str,
        rows: &[serde_json::Value],
    ) -> WorkerResult<()> {
        self.pages
            .lock()
            .push((invocation_id.to_string(), rows.to_vec()));
        Ok(())
    }
}
