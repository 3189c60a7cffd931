//! Pending-acknowledgement registry
//!
//! Each outbound request that expects a broker reply registers exactly one
//! pending entry; the event loop fulfils it exactly once when the correlated
//! ack arrives. Waits are always bounded; the registry's `await_ack` is the
//! only way a caller blocks on a reply.

use crate::error::ClientError;
use crate::transport::AckId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Registry of outstanding request/acknowledgement correlations
#[derive(Debug, Default)]
pub struct AckTable {
    pending: Mutex<HashMap<AckId, oneshot::Sender<Value>>>,
}

impl AckTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending acknowledgement, returning its correlation id
    /// and the receiving half of the one-shot rendezvous.
    pub fn register(&self) -> (AckId, oneshot::Receiver<Value>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("ack table lock poisoned")
            .insert(id, tx);
        (id, rx)
    }

    /// Fulfil a pending entry. Returns false when the id is unknown or was
    /// already fulfilled; duplicate acks are dropped, never double-delivered.
    pub fn fulfill(&self, id: AckId, payload: Value) -> bool {
        let sender = self
            .pending
            .lock()
            .expect("ack table lock poisoned")
            .remove(&id);
        match sender {
            Some(tx) => {
                // A closed receiver means the waiter gave up (timeout); the
                // late ack is dropped on the floor either way.
                if tx.send(payload).is_err() {
                    debug!(ack_id = %id, "Ack arrived after its waiter timed out");
                }
                true
            }
            None => {
                warn!(ack_id = %id, "Ack with no pending request, dropping");
                false
            }
        }
    }

    /// Drop a pending entry without fulfilling it (e.g. the emit failed)
    pub fn cancel(&self, id: AckId) {
        self.pending
            .lock()
            .expect("ack table lock poisoned")
            .remove(&id);
    }

    /// Number of outstanding entries
    pub fn outstanding(&self) -> usize {
        self.pending.lock().expect("ack table lock poisoned").len()
    }

    /// Await one acknowledgement with a bound. `event` names the request for
    /// the timeout error. A wait that ends without a reply removes its
    /// pending entry; a broker that stops acking cannot grow the table.
    pub async fn await_ack(
        &self,
        id: AckId,
        rx: oneshot::Receiver<Value>,
        timeout: Duration,
        event: &str,
    ) -> Result<Value, ClientError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => {
                self.cancel(id);
                Err(ClientError::protocol_decode(
                    event,
                    "acknowledgement channel closed before a reply arrived",
                ))
            }
            Err(_) => {
                self.cancel(id);
                Err(ClientError::AckTimeout {
                    event: event.to_string(),
                    timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_fulfill() {
        let table = AckTable::new();
        let (id, rx) = table.register();
        assert_eq!(table.outstanding(), 1);

        assert!(table.fulfill(id, json!({"ok": true})));
        assert_eq!(table.outstanding(), 0);

        let payload = table
            .await_ack(id, rx, Duration::from_millis(100), "test")
            .await
            .unwrap();
        assert_eq!(payload, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_fulfill_exactly_once() {
        let table = AckTable::new();
        let (id, _rx) = table.register();

        assert!(table.fulfill(id, json!(1)));
        // Second delivery finds nothing pending
        assert!(!table.fulfill(id, json!(2)));
    }

    #[tokio::test]
    async fn test_unknown_ack_is_dropped() {
        let table = AckTable::new();
        assert!(!table.fulfill(Uuid::new_v4(), json!({})));
    }

    #[tokio::test]
    async fn test_await_ack_times_out_and_removes_entry() {
        let table = AckTable::new();
        let (id, rx) = table.register();

        let result = table.await_ack(id, rx, Duration::from_millis(10), "register").await;
        match result {
            Err(ClientError::AckTimeout { event, .. }) => assert_eq!(event, "register"),
            other => panic!("expected AckTimeout, got {other:?}"),
        }
        // The failed wait cleaned up after itself
        assert_eq!(table.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_entry() {
        let table = AckTable::new();
        let (id, rx) = table.register();
        table.cancel(id);
        assert_eq!(table.outstanding(), 0);

        // The waiter sees a closed channel, not a hang
        let result = table.await_ack(id, rx, Duration::from_millis(100), "message").await;
        assert!(matches!(result, Err(ClientError::ProtocolDecode { .. })));
    }

    #[tokio::test]
    async fn test_late_ack_after_timeout_is_ignored() {
        let table = AckTable::new();
        let (id, rx) = table.register();

        let result = table.await_ack(id, rx, Duration::from_millis(5), "whoami").await;
        assert!(result.is_err());
        assert_eq!(table.outstanding(), 0);

        // The late ack finds nothing pending and is dropped
        assert!(!table.fulfill(id, json!({})));
    }
}
