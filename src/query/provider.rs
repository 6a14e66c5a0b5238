//! # External Query Provider Seam
//!
//! The asynchronous query service executes SQL out of band; this crate
//! only polls its execution state and walks its paginated results through
//! an opaque page-token cursor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by query provider implementations
#[derive(Error, Debug)]
pub enum QueryProviderError {
    #[error("Unknown execution: {execution_id}")]
    UnknownExecution { execution_id: String },

    #[error("Query provider request failed: {operation}: {message}")]
    RequestFailed { operation: String, message: String },
}

impl QueryProviderError {
    pub fn unknown_execution(execution_id: impl Into<String>) -> Self {
        Self::UnknownExecution {
            execution_id: execution_id.into(),
        }
    }

    pub fn request_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Lifecycle state of an external query execution.
///
/// `Queued` and `Running` are transient and never errors; `Succeeded` is
/// the only state results may be read from; `Failed` and `Cancelled` are
/// terminal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    /// Still in flight, worth polling again later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Terminally unsuccessful
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// Execution state plus the provider's stated reason, when one exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    pub reason: Option<String>,
}

impl ExecutionStatus {
    pub fn new(state: ExecutionState) -> Self {
        Self {
            state,
            reason: None,
        }
    }

    pub fn with_reason(state: ExecutionState, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: Some(reason.into()),
        }
    }
}

/// One page of query results plus the cursor to the next page.
///
/// A `None` next token means the result set is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPage {
    pub rows: Vec<serde_json::Value>,
    pub next_token: Option<String>,
}

/// Client handle to the external async query service
#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Current lifecycle state of an execution
    async fn execution_status(
        &self,
        execution_id: &str,
    ) -> Result<ExecutionStatus, QueryProviderError>;

    /// Fetch one page of up to `max_rows` rows starting at `page_token`
    /// (`None` = from the beginning)
    async fn results_page(
        &self,
        execution_id: &str,
        page_token: Option<&str>,
        max_rows: u32,
    ) -> Result<ResultPage, QueryProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classification() {
        assert!(ExecutionState::Queued.is_transient());
        assert!(ExecutionState::Running.is_transient());
        assert!(!ExecutionState::Succeeded.is_transient());
        assert!(ExecutionState::Failed.is_terminal_failure());
        assert!(ExecutionState::Cancelled.is_terminal_failure());
        assert!(!ExecutionState::Succeeded.is_terminal_failure());
    }

    #[test]
    fn test_state_serde_uses_provider_names() {
        let serialized = serde_json::to_string(&ExecutionState::Succeeded).unwrap();
        assert_eq!(serialized, "\"SUCCEEDED\"");
        let parsed: ExecutionState = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(parsed, ExecutionState::Cancelled);
    }
}
