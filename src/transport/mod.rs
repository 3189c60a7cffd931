//! Transport seam for the broker channel
//!
//! The client speaks named events with optional correlated acknowledgements
//! over one persistent bidirectional channel. The concrete socket
//! implementation lives outside this crate; [`Transport`] abstracts it so
//! the protocol engine can be driven by a real socket or by
//! `crate::testing::MockTransport`.

use crate::config::ConnectionConfig;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Correlation id tying an outbound request to its acknowledgement
pub type AckId = Uuid;

/// Everything a transport can deliver to the client
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The underlying channel finished connecting
    Connected,
    /// The underlying channel dropped, with a reason if one is known
    Disconnected(String),
    /// A named broker event with its JSON payload
    Event { name: String, payload: Value },
    /// The acknowledgement correlated to a prior emit
    Ack { id: AckId, payload: Value },
}

/// A reconnectable bidirectional event channel to one broker endpoint
///
/// `open` yields a fresh event stream for each session; dropping the old
/// receiver is the subscription reset; no listener bookkeeping survives a
/// reconnect.
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a session and return the stream of inbound events for it
    async fn open(
        &self,
        config: &ConnectionConfig,
    ) -> Result<mpsc::Receiver<TransportEvent>, Self::Error>;

    /// Emit a named event. When `ack` is set the broker is expected to reply
    /// with exactly one [`TransportEvent::Ack`] carrying the same id.
    async fn emit(
        &self,
        event: &str,
        payload: Value,
        ack: Option<AckId>,
    ) -> Result<(), Self::Error>;

    /// Close the current session, ending its event stream
    async fn close(&self) -> Result<(), Self::Error>;
}
