//! Mock implementations for testing
//!
//! [`MockTransport`] records emitted traffic, answers acknowledgements from
//! scripted replies, and lets tests inject inbound events.
//! [`MockPlugin`] streams every callback it receives to the test.
//! [`MemoryConfigStore`] is the in-memory credential store.

use crate::config::{ConnectionConfig, DeviceIdentity};
use crate::plugin::Plugin;
use crate::store::{DeviceConfigStore, StoreError, StoredConfig};
use crate::transport::{AckId, Transport, TransportEvent};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors the mock transport can produce on demand
#[derive(Debug, Error)]
pub enum MockTransportError {
    #[error("mock transport: open refused")]
    OpenRefused,
    #[error("mock transport: emit refused")]
    EmitRefused,
}

/// One recorded outbound emission
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub name: String,
    pub payload: Value,
    pub ack: Option<AckId>,
}

#[derive(Default)]
struct MockTransportInner {
    session: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    emitted: Mutex<Vec<EmittedEvent>>,
    ack_scripts: Mutex<HashMap<String, VecDeque<Value>>>,
    opened: Mutex<Vec<ConnectionConfig>>,
    fail_open: AtomicBool,
    fail_emit: AtomicBool,
}

/// Mock broker channel. Clones share state, so a test can keep a handle
/// while the client owns the transport.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `open` always fails
    pub fn with_open_failure() -> Self {
        let transport = Self::new();
        transport.inner.fail_open.store(true, Ordering::SeqCst);
        transport
    }

    /// Make subsequent `emit` calls fail
    pub fn fail_emits(&self, fail: bool) {
        self.inner.fail_emit.store(fail, Ordering::SeqCst);
    }

    /// Queue the acknowledgement payload for the next ack-carrying emit of
    /// `event`. Replies are consumed in FIFO order per event name.
    pub fn script_ack(&self, event: &str, payload: Value) {
        self.inner
            .ack_scripts
            .lock()
            .expect("mock lock poisoned")
            .entry(event.to_string())
            .or_default()
            .push_back(payload);
    }

    /// Deliver an event to the current session's stream
    pub async fn inject(&self, event: TransportEvent) {
        let sender = self
            .inner
            .session
            .lock()
            .expect("mock lock poisoned")
            .clone();
        if let Some(sender) = sender {
            sender.send(event).await.expect("session stream gone");
        } else {
            panic!("inject called with no open session");
        }
    }

    /// Deliver a named broker event to the current session's stream
    pub async fn inject_event(&self, name: &str, payload: Value) {
        self.inject(TransportEvent::Event {
            name: name.to_string(),
            payload,
        })
        .await;
    }

    /// Drop the session sender, ending the event stream as a dead socket
    /// would
    pub fn drop_session(&self) {
        self.inner
            .session
            .lock()
            .expect("mock lock poisoned")
            .take();
    }

    /// All recorded emissions, in order
    pub fn emitted(&self) -> Vec<EmittedEvent> {
        self.inner
            .emitted
            .lock()
            .expect("mock lock poisoned")
            .clone()
    }

    /// Recorded emissions with the given event name
    pub fn emitted_named(&self, name: &str) -> Vec<EmittedEvent> {
        self.emitted()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// Configs passed to `open`, in order
    pub fn opened_sessions(&self) -> Vec<ConnectionConfig> {
        self.inner
            .opened
            .lock()
            .expect("mock lock poisoned")
            .clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn open(
        &self,
        config: &ConnectionConfig,
    ) -> Result<mpsc::Receiver<TransportEvent>, Self::Error> {
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(MockTransportError::OpenRefused);
        }

        self.inner
            .opened
            .lock()
            .expect("mock lock poisoned")
            .push(config.clone());

        let (tx, rx) = mpsc::channel(64);
        // The channel comes up immediately, like a loopback socket
        tx.send(TransportEvent::Connected)
            .await
            .expect("fresh channel");
        *self.inner.session.lock().expect("mock lock poisoned") = Some(tx);
        Ok(rx)
    }

    async fn emit(
        &self,
        event: &str,
        payload: Value,
        ack: Option<AckId>,
    ) -> Result<(), Self::Error> {
        if self.inner.fail_emit.load(Ordering::SeqCst) {
            return Err(MockTransportError::EmitRefused);
        }

        self.inner
            .emitted
            .lock()
            .expect("mock lock poisoned")
            .push(EmittedEvent {
                name: event.to_string(),
                payload,
                ack,
            });

        // Answer from the script, if the emit expects an ack and one is queued
        if let Some(id) = ack {
            let reply = self
                .inner
                .ack_scripts
                .lock()
                .expect("mock lock poisoned")
                .get_mut(event)
                .and_then(VecDeque::pop_front);
            if let Some(reply) = reply {
                let sender = self
                    .inner
                    .session
                    .lock()
                    .expect("mock lock poisoned")
                    .clone();
                if let Some(sender) = sender {
                    let _ = sender.send(TransportEvent::Ack { id, payload: reply }).await;
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.drop_session();
        Ok(())
    }
}

/// One plugin callback as observed by a test
#[derive(Debug, Clone, PartialEq)]
pub enum PluginCall {
    Ready,
    Message(Value),
    Error(String),
    Config(Value),
}

/// Plugin double that forwards every callback to a channel
pub struct MockPlugin {
    tx: mpsc::UnboundedSender<PluginCall>,
}

impl MockPlugin {
    /// Create a plugin and the stream of calls it will receive
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PluginCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    async fn on_ready(&self) {
        let _ = self.tx.send(PluginCall::Ready);
    }

    async fn on_message(&self, payload: Value) {
        let _ = self.tx.send(PluginCall::Message(payload));
    }

    async fn on_error(&self, message: String) {
        let _ = self.tx.send(PluginCall::Error(message));
    }

    async fn on_config(&self, config: Value) {
        let _ = self.tx.send(PluginCall::Config(config));
    }
}

/// In-memory [`DeviceConfigStore`]; clones share contents
#[derive(Debug, Clone)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<StoredConfig>>,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoredConfig::unconfigured())),
        }
    }

    /// A store already holding a registered identity
    pub fn with_identity(uuid: &str, token: &str) -> Self {
        let store = Self::new();
        store
            .inner
            .lock()
            .expect("store lock poisoned")
            .identity = Some(DeviceIdentity {
            uuid: uuid.to_string(),
            token: token.to_string(),
        });
        store
    }

    /// Override the broker endpoint
    pub fn set_broker(&self, url: &str, port: u16) {
        let mut config = self.inner.lock().expect("store lock poisoned");
        config.broker_url = url.to_string();
        config.broker_port = port;
    }

    /// Current contents, as a read would see them
    pub fn snapshot(&self) -> StoredConfig {
        self.inner.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait]
impl DeviceConfigStore for MemoryConfigStore {
    async fn read(&self) -> Result<StoredConfig, StoreError> {
        Ok(self.snapshot())
    }

    async fn write(&self, uuid: &str, token: &str) -> Result<(), StoreError> {
        self.inner.lock().expect("store lock poisoned").identity = Some(DeviceIdentity {
            uuid: uuid.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}
