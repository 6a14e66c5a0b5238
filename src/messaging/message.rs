//! # Message Wire Shapes
//!
//! Payload envelopes shared between producers and the worker loop: the
//! received-message pair (payload + receipt), the batch envelope carrying
//! ordered sub-units, and the continuation request for paginated query
//! results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{MessagingError, MessagingResult};

/// Opaque acknowledgment handle for a received message.
///
/// The transport mints these on receive; deleting or extending visibility
/// requires handing the same handle back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message pulled off a queue: opaque payload plus its receipt handle
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub payload: serde_json::Value,
    pub receipt: ReceiptHandle,
}

/// Delivery metadata carried inside batch envelopes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl MessageMetadata {
    pub fn new() -> Self {
        Self {
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }

    /// Metadata for a republished unit: fresh timestamp, bumped retry count
    pub fn retried(&self) -> Self {
        Self {
            enqueued_at: Utc::now(),
            retry_count: self.retry_count + 1,
        }
    }
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch envelope: one transport message wrapping an ordered, non-empty
/// sequence of independent sub-units.
///
/// A batch of size 1 is still a batch envelope; the splitter treats it
/// differently on recoverable failure (the error propagates instead of
/// being converted into a republish).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMessage {
    pub items: Vec<serde_json::Value>,
    pub metadata: MessageMetadata,
}

impl BatchMessage {
    pub fn new(items: Vec<serde_json::Value>) -> Self {
        Self {
            items,
            metadata: MessageMetadata::new(),
        }
    }

    /// Single-unit envelope republished after a recoverable item failure
    pub fn single_retry(item: serde_json::Value, previous: &MessageMetadata) -> Self {
        Self {
            items: vec![item],
            metadata: previous.retried(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Deserialize a batch envelope from a raw queue payload
    pub fn from_payload(payload: &serde_json::Value) -> MessagingResult<Self> {
        let batch: BatchMessage = serde_json::from_value(payload.clone())?;
        if batch.is_empty() {
            return Err(MessagingError::message_deserialization(
                "batch message contained no items",
            ));
        }
        Ok(batch)
    }
}

/// Continuation request for resuming a paginated external query.
///
/// Wire shape: `{query_kind, invocation_id, execution_id, page_token}`.
/// A `None` page token means "from the beginning".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationRequest {
    pub query_kind: String,
    pub invocation_id: String,
    pub execution_id: String,
    #[serde(default)]
    pub page_token: Option<String>,
}

impl ContinuationRequest {
    /// New from-the-start request with a generated invocation id
    pub fn new(query_kind: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            query_kind: query_kind.into(),
            invocation_id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            page_token: None,
        }
    }

    /// Successor request picking up at the given page token
    pub fn continued_at(&self, page_token: String) -> Self {
        Self {
            query_kind: self.query_kind.clone(),
            invocation_id: self.invocation_id.clone(),
            execution_id: self.execution_id.clone(),
            page_token: Some(page_token),
        }
    }

    /// Deserialize a continuation request from a raw queue payload
    pub fn from_payload(payload: &serde_json::Value) -> MessagingResult<Self> {
        Ok(serde_json::from_value(payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_message_serialization() {
        let batch = BatchMessage::new(vec![json!({"change_id": 1}), json!({"change_id": 2})]);

        let serialized = serde_json::to_value(&batch).expect("Failed to serialize");
        let deserialized = BatchMessage::from_payload(&serialized).expect("Failed to deserialize");

        assert_eq!(deserialized.len(), 2);
        assert_eq!(deserialized.items[0], json!({"change_id": 1}));
        assert_eq!(deserialized.metadata.retry_count, 0);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let payload = serde_json::to_value(BatchMessage {
            items: vec![],
            metadata: MessageMetadata::new(),
        })
        .unwrap();

        let err = BatchMessage::from_payload(&payload).unwrap_err();
        assert!(matches!(err, MessagingError::MessageDeserialization { .. }));
    }

    #[test]
    fn test_single_retry_bumps_retry_count() {
        let batch = BatchMessage::new(vec![json!(1), json!(2)]);
        let retried = BatchMessage::single_retry(json!(2), &batch.metadata);

        assert_eq!(retried.len(), 1);
        assert_eq!(retried.items[0], json!(2));
        assert_eq!(retried.metadata.retry_count, 1);
    }

    #[test]
    fn test_continuation_request_round_trip() {
        let request = ContinuationRequest::new("access_record", "exec-123");
        assert!(request.page_token.is_none());
        assert!(!request.invocation_id.is_empty());

        let payload = serde_json::to_value(&request).unwrap();
        let parsed = ContinuationRequest::from_payload(&payload).unwrap();
        assert_eq!(parsed.query_kind, "access_record");
        assert_eq!(parsed.execution_id, "exec-123");
        assert_eq!(parsed.invocation_id, request.invocation_id);
    }

    #[test]
    fn test_continuation_request_defaults_missing_token() {
        let payload = json!({
            "query_kind": "access_record",
            "invocation_id": "inv-1",
            "execution_id": "exec-1"
        });
        let parsed = ContinuationRequest::from_payload(&payload).unwrap();
        assert!(parsed.page_token.is_none());
    }

    #[test]
    fn test_continued_at_preserves_identity() {
        let request = ContinuationRequest::new("audit", "exec-9");
        let next = request.continued_at("token-42".to_string());

        assert_eq!(next.query_kind, request.query_kind);
        assert_eq!(next.invocation_id, request.invocation_id);
        assert_eq!(next.execution_id, request.execution_id);
        assert_eq!(next.page_token.as_deref(), Some("token-42"));
    }
}
