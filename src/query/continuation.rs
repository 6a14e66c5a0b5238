//! # Continuation Driver
//!
//! Resumes a paginated external query from an opaque page token, hands a
//! bounded number of pages to a per-kind results processor, and republishes
//! a continuation request for whatever remains. The per-invocation page
//! budget keeps any single lease holder's walk short; a different
//! invocation picks up the cursor where this one left off.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::provider::{QueryProvider, QueryProviderError};
use crate::constants::{DEFAULT_MAX_PAGE_FETCHES, DEFAULT_MAX_ROWS_PER_PAGE};
use crate::messaging::{ContinuationRequest, QueueClient};
use crate::progress::ProgressSignal;
use crate::worker::errors::{WorkerError, WorkerResult};
use crate::worker::runner::MessageRunner;

/// Per-kind consumer of fetched result pages
#[async_trait]
pub trait ResultPageProcessor: Send + Sync {
    /// Handle one page of rows belonging to `invocation_id`
    async fn process_rows(
        &self,
        invocation_id: &str,
        rows: &[serde_json::Value],
    ) -> WorkerResult<()>;
}

/// Page-fetch budgets for one continuation invocation
#[derive(Debug, Clone)]
pub struct ContinuationSettings {
    /// Maximum rows per page fetch
    pub max_rows_per_page: u32,
    /// Maximum page fetches per invocation before the cursor is handed off
    pub max_page_fetches: u32,
}

impl Default for ContinuationSettings {
    fn default() -> Self {
        Self {
            max_rows_per_page: DEFAULT_MAX_ROWS_PER_PAGE,
            max_page_fetches: DEFAULT_MAX_PAGE_FETCHES,
        }
    }
}

/// Drives bounded walks over paginated query results
pub struct ContinuationDriver {
    provider: Arc<dyn QueryProvider>,
    queue: Arc<dyn QueueClient>,
    queue_name: String,
    processors: HashMap<String, Arc<dyn ResultPageProcessor>>,
    settings: ContinuationSettings,
}

impl ContinuationDriver {
    /// Driver publishing its continuations to `queue_name`
    pub fn new(
        provider: Arc<dyn QueryProvider>,
        queue: Arc<dyn QueueClient>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            queue,
            queue_name: queue_name.into(),
            processors: HashMap::new(),
            settings: ContinuationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ContinuationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register the processor for one query kind
    pub fn register_processor(
        mut self,
        query_kind: impl Into<String>,
        processor: Arc<dyn ResultPageProcessor>,
    ) -> Self {
        self.processors.insert(query_kind.into(), processor);
        self
    }

    /// Process one continuation request against `queue_name`.
    ///
    /// A still-running execution is a recoverable failure (retry later); a
    /// failed or cancelled execution is fatal with the provider's reason.
    /// Only a succeeded execution is read, at most
    /// `max_page_fetches` pages per call; a leftover cursor is republished
    /// for the next invocation.
    pub async fn process_continuation(
        &self,
        request: &ContinuationRequest,
        queue_name: &str,
    ) -> WorkerResult<()> {
        if request.query_kind.trim().is_empty() {
            return Err(WorkerError::invalid_argument("query_kind is required"));
        }
        if request.invocation_id.trim().is_empty() {
            return Err(WorkerError::invalid_argument("invocation_id is required"));
        }
        if request.execution_id.trim().is_empty() {
            return Err(WorkerError::invalid_argument("execution_id is required"));
        }

        let processor = self.processors.get(&request.query_kind).ok_or_else(|| {
            WorkerError::fatal(format!(
                "no results processor registered for query kind '{}'",
                request.query_kind
            ))
        })?;

        let status = self
            .provider
            .execution_status(&request.execution_id)
            .await
            .map_err(provider_error)?;

        if status.state.is_transient() {
            return Err(WorkerError::recoverable(format!(
                "query execution {} is still {}",
                request.execution_id, status.state
            )));
        }
        if status.state.is_terminal_failure() {
            return Err(WorkerError::fatal(format!(
                "query execution {} ended as {}: {}",
                request.execution_id,
                status.state,
                status.reason.as_deref().unwrap_or("no reason given")
            )));
        }

        let mut page_token = request.page_token.clone();
        for fetch in 0..self.settings.max_page_fetches {
            let page = self
                .provider
                .results_page(
                    &request.execution_id,
                    page_token.as_deref(),
                    self.settings.max_rows_per_page,
                )
                .await
                .map_err(provider_error)?;

            if page.rows.is_empty() {
                debug!(
                    execution_id = %request.execution_id,
                    fetches = fetch,
                    "Empty page; continuation finished"
                );
                return Ok(());
            }

            processor
                .process_rows(&request.invocation_id, &page.rows)
                .await?;

            page_token = page.next_token;
            if page_token.is_none() {
                debug!(
                    execution_id = %request.execution_id,
                    fetches = fetch + 1,
                    "Result set exhausted"
                );
                return Ok(());
            }
        }

        // Budget spent with pages left: hand the cursor to a fresh
        // invocation.
        let Some(token) = page_token else {
            return Ok(());
        };
        info!(
            execution_id = %request.execution_id,
            queue_name,
            "Page budget exhausted; republishing continuation"
        );
        let continuation = request.continued_at(token);
        self.queue
            .send_json(queue_name, &serde_json::to_value(&continuation)?)
            .await?;
        Ok(())
    }
}

fn provider_error(error: QueryProviderError) -> WorkerError {
    WorkerError::fatal(error.to_string())
}

/// Lets the gated loop dispatch continuation requests directly
#[async_trait]
impl MessageRunner for ContinuationDriver {
    async fn run(
        &self,
        _progress: Arc<dyn ProgressSignal>,
        payload: serde_json::Value,
    ) -> WorkerResult<()> {
        let request = ContinuationRequest::from_payload(&payload)?;
        self.process_continuation(&request, &self.queue_name).await
    }
}
