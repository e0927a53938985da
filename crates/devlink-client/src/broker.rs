//! Correlation of requests with their responses.
//!
//! Each broker-mediated request gets a fresh [`CorrelationId`]. The response
//! frame echoes it as `resultId`, and [`PendingResultBroker::settle`] hands the
//! payload to whoever is awaiting the matching [`PendingResult`].

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use devlink_core::{CorrelationId, is_truthy};

use crate::errors::{ClientError, Result};

const MISSING_ERROR_MESSAGE: &str = "request returned no result";

type Settler = oneshot::Sender<Result<Value>>;
type PendingTable = Mutex<HashMap<CorrelationId, Settler>>;

/// Table of requests awaiting a response.
#[derive(Debug, Default)]
pub struct PendingResultBroker {
    pending: Arc<PendingTable>,
}

impl PendingResultBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh correlation id.
    pub fn issue(&self) -> CorrelationId {
        CorrelationId::new()
    }

    /// Start waiting for a response to `id`.
    ///
    /// Register before sending the request so a fast response cannot race
    /// past the table.
    pub fn register(&self, id: CorrelationId) -> PendingResult {
        let (tx, rx) = oneshot::channel();
        if self.pending.lock().insert(id.clone(), tx).is_some() {
            debug!(result_id = %id, "replaced pending entry with duplicate id");
        }
        PendingResult {
            id,
            rx,
            table: Arc::downgrade(&self.pending),
        }
    }

    /// Settle the entry for `id`.
    ///
    /// A truthy `result` resolves the waiter; anything else rejects it with
    /// [`ClientError::Remote`] built from `error`. Returns `false` and does
    /// nothing when no entry is pending under `id`.
    pub fn settle(&self, id: &CorrelationId, result: Option<Value>, error: Option<Value>) -> bool {
        let Some(tx) = self.pending.lock().remove(id) else {
            debug!(result_id = %id, "dropping response for unknown result id");
            return false;
        };
        let outcome = match result {
            Some(value) if is_truthy(&value) => Ok(value),
            _ => Err(ClientError::Remote {
                message: error_message(error),
            }),
        };
        if tx.send(outcome).is_err() {
            debug!(result_id = %id, "waiter gone before settlement");
        }
        true
    }

    /// Drop the entry for `id` without settling it.
    pub fn forget(&self, id: &CorrelationId) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Reject every pending entry with [`ClientError::Disconnected`].
    ///
    /// Returns the number of entries rejected.
    pub fn reject_all(&self) -> usize {
        let drained: Vec<Settler> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(ClientError::Disconnected));
        }
        count
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Caller-side half of a pending request.
///
/// Dropping it before settlement removes the entry from the broker.
#[derive(Debug)]
pub struct PendingResult {
    id: CorrelationId,
    rx: oneshot::Receiver<Result<Value>>,
    table: Weak<PendingTable>,
}

impl PendingResult {
    /// Correlation id the response must echo.
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Wait for settlement.
    pub async fn wait(mut self) -> Result<Value> {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::Disconnected),
        }
    }
}

impl Drop for PendingResult {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            let _ = table.lock().remove(&self.id);
        }
    }
}

fn error_message(error: Option<Value>) -> String {
    match error {
        Some(Value::String(message)) if !message.is_empty() => message,
        Some(Value::Null | Value::String(_)) | None => MISSING_ERROR_MESSAGE.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn issued_ids_are_unique() {
        let broker = PendingResultBroker::new();
        let a = broker.issue();
        let b = broker.issue();
        assert_ne!(a, b);
        assert!(a.as_str().len() >= 32);
    }

    #[tokio::test]
    async fn truthy_result_resolves() {
        let broker = PendingResultBroker::new();
        let id = broker.issue();
        let pending = broker.register(id.clone());
        assert!(broker.settle(&id, Some(json!({"pkg": "1.0"})), None));
        assert_eq!(pending.wait().await.unwrap(), json!({"pkg": "1.0"}));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn falsy_result_rejects_with_error_payload() {
        let broker = PendingResultBroker::new();
        let id = broker.issue();
        let pending = broker.register(id.clone());
        assert!(broker.settle(&id, Some(json!("")), Some(json!("boom"))));
        assert_matches!(pending.wait().await, Err(ClientError::Remote { message }) => {
            assert_eq!(message, "boom");
        });
    }

    #[tokio::test]
    async fn missing_error_payload_uses_fixed_message() {
        let broker = PendingResultBroker::new();
        let id = broker.issue();
        let pending = broker.register(id.clone());
        assert!(broker.settle(&id, None, None));
        assert_matches!(pending.wait().await, Err(ClientError::Remote { message }) => {
            assert_eq!(message, MISSING_ERROR_MESSAGE);
        });
    }

    #[tokio::test]
    async fn outstanding_requests_settle_independently() {
        let broker = PendingResultBroker::new();
        let first_id = broker.issue();
        let second_id = broker.issue();
        let first = broker.register(first_id.clone());
        let second = broker.register(second_id.clone());
        assert_eq!(broker.pending_count(), 2);

        assert!(broker.settle(&second_id, Some(json!(2)), None));
        assert_eq!(second.wait().await.unwrap(), json!(2));
        assert_eq!(broker.pending_count(), 1);

        assert!(broker.settle(&first_id, None, Some(json!({"code": 7}))));
        assert_matches!(first.wait().await, Err(ClientError::Remote { message }) => {
            assert_eq!(message, r#"{"code":7}"#);
        });
    }

    #[tokio::test]
    async fn unknown_id_has_no_effect() {
        let broker = PendingResultBroker::new();
        let id = broker.issue();
        let pending = broker.register(id.clone());

        assert!(!broker.settle(&CorrelationId::from("stranger"), Some(json!(1)), None));
        assert_eq!(broker.pending_count(), 1);

        assert!(broker.settle(&id, Some(json!(true)), None));
        assert_eq!(pending.wait().await.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn settles_at_most_once() {
        let broker = PendingResultBroker::new();
        let id = broker.issue();
        let pending = broker.register(id.clone());
        assert!(broker.settle(&id, Some(json!(1)), None));
        assert!(!broker.settle(&id, Some(json!(2)), None));
        assert_eq!(pending.wait().await.unwrap(), json!(1));
    }

    #[test]
    fn dropping_pending_result_removes_entry() {
        let broker = PendingResultBroker::new();
        let pending = broker.register(broker.issue());
        assert_eq!(broker.pending_count(), 1);
        drop(pending);
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn reject_all_disconnects_waiters() {
        let broker = PendingResultBroker::new();
        let a = broker.register(broker.issue());
        let b = broker.register(broker.issue());
        assert_eq!(broker.reject_all(), 2);
        assert_matches!(a.wait().await, Err(ClientError::Disconnected));
        assert_matches!(b.wait().await, Err(ClientError::Disconnected));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn forget_then_wait_reports_disconnected() {
        let broker = PendingResultBroker::new();
        let id = broker.issue();
        let pending = broker.register(id.clone());
        assert!(broker.forget(&id));
        assert!(!broker.forget(&id));
        assert_matches!(pending.wait().await, Err(ClientError::Disconnected));
    }

    #[test]
    fn error_message_rendering() {
        assert_eq!(error_message(Some(json!("x"))), "x");
        assert_eq!(error_message(Some(json!(null))), MISSING_ERROR_MESSAGE);
        assert_eq!(error_message(Some(json!(""))), MISSING_ERROR_MESSAGE);
        assert_eq!(error_message(Some(json!(42))), "42");
    }
}
