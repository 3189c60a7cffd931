//! Meshblu client: session lifecycle, registration, and message exchange
//!
//! A [`MeshbluClient`] is an explicitly constructed, caller-owned value: one
//! client, one device identity, one transport session at a time. `connect`
//! drives the session event loop until `disconnect` is called from any task;
//! `register` runs a short-lived session of its own. Overlapping `connect`
//! and `register` calls on one client are rejected with
//! [`ClientError::Busy`] rather than left undefined.

use crate::config::{ClientOptions, ConnectionConfig, DeviceIdentity, DeviceSchemas, NotReadyPolicy};
use crate::error::{ClientError, ClientResult};
use crate::plugin::Plugin;
use crate::protocol::events::{self, names};
use crate::protocol::{build_descriptor, InboundEvent, MessagePayload};
use crate::store::DeviceConfigStore;
use crate::transport::{Transport, TransportEvent};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

mod acks;
mod handshake;

pub use acks::AckTable;
pub use handshake::HandshakeState;

/// Client for one device's connection to the Meshblu broker
pub struct MeshbluClient<T, S>
where
    T: Transport + 'static,
    S: DeviceConfigStore,
{
    transport: Arc<T>,
    store: S,
    plugin: Arc<dyn Plugin>,
    options: ClientOptions,
    acks: Arc<AckTable>,
    state_tx: watch::Sender<HandshakeState>,
    state_rx: watch::Receiver<HandshakeState>,
    shutdown: std::sync::Mutex<Option<watch::Sender<bool>>>,
    // Held across connect/register; try_lock failure means overlap
    activity: tokio::sync::Mutex<()>,
}

impl<T, S> MeshbluClient<T, S>
where
    T: Transport + 'static,
    S: DeviceConfigStore,
{
    pub fn new(transport: T, store: S, plugin: Arc<dyn Plugin>) -> Self {
        Self::with_options(transport, store, plugin, ClientOptions::default())
    }

    pub fn with_options(
        transport: T,
        store: S,
        plugin: Arc<dyn Plugin>,
        options: ClientOptions,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(HandshakeState::Disconnected);
        Self {
            transport: Arc::new(transport),
            store,
            plugin,
            options,
            acks: Arc::new(AckTable::new()),
            state_tx,
            state_rx,
            shutdown: std::sync::Mutex::new(None),
            activity: tokio::sync::Mutex::new(()),
        }
    }

    /// Current handshake state
    pub fn handshake_state(&self) -> HandshakeState {
        *self.state_rx.borrow()
    }

    /// Watch handshake transitions (e.g. to await `Ready` in tests)
    pub fn state_watch(&self) -> watch::Receiver<HandshakeState> {
        self.state_rx.clone()
    }

    fn set_state(&self, next: HandshakeState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = ?state, to = ?next, "Handshake transition");
            *state = next;
            true
        });
    }

    /// Connect to the broker and serve inbound events until [`disconnect`]
    /// is called or the transport's event stream ends.
    ///
    /// Requires a registered identity in the store; fails with
    /// [`ClientError::NotConfigured`] otherwise. Suspends the calling task
    /// for the life of the session.
    ///
    /// [`disconnect`]: MeshbluClient::disconnect
    pub async fn connect(&self, schemas: DeviceSchemas) -> ClientResult<()> {
        let _activity = self.activity.try_lock().map_err(|_| ClientError::Busy)?;

        let stored = self.store.read().await?;
        let identity = stored.identity.clone().ok_or(ClientError::NotConfigured)?;
        let config = ConnectionConfig::from_stored(&stored)?;

        self.set_state(HandshakeState::Connecting);
        let mut events = match self.transport.open(&config).await {
            Ok(events) => events,
            Err(e) => {
                self.set_state(HandshakeState::Disconnected);
                return Err(ClientError::transport_setup(e));
            }
        };

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *self.shutdown.lock().expect("shutdown lock poisoned") = Some(shutdown_tx);

        info!(uuid = %identity.uuid, url = %config.url, "Connected session starting");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Disconnect requested, leaving session");
                        break;
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event, &identity, &schemas).await,
                        None => {
                            warn!("Transport event stream ended, leaving session");
                            break;
                        }
                    }
                }
            }
        }

        *self.shutdown.lock().expect("shutdown lock poisoned") = None;
        self.set_state(self.handshake_state().on_teardown());
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Transport close failed");
        }
        Ok(())
    }

    /// Release a blocked [`connect`] and close the session. Safe to call
    /// from any task; a no-op when no session is active.
    ///
    /// [`connect`]: MeshbluClient::connect
    pub fn disconnect(&self) {
        match self.shutdown.lock().expect("shutdown lock poisoned").take() {
            Some(tx) => {
                let _ = tx.send(true);
            }
            None => debug!("Disconnect with no active session"),
        }
    }

    async fn handle_transport_event(
        &self,
        event: TransportEvent,
        identity: &DeviceIdentity,
        schemas: &DeviceSchemas,
    ) {
        match event {
            TransportEvent::Connected => {
                self.set_state(self.handshake_state().on_transport_connected());
            }
            TransportEvent::Disconnected(reason) => {
                // No reconnect logic lives here; if the transport gives up,
                // its event stream ends and connect returns.
                warn!(%reason, "Transport reported disconnect");
            }
            TransportEvent::Ack { id, payload } => {
                self.acks.fulfill(id, payload);
            }
            TransportEvent::Event { name, payload } => {
                match InboundEvent::decode(&name, payload) {
                    Ok(inbound) => {
                        self.set_state(self.handshake_state().on_inbound(&inbound));
                        self.handle_inbound(inbound, identity, schemas).await;
                    }
                    // Handler boundary: decode failures never kill the session
                    Err(e) => warn!(event = %name, error = %e, "Dropping undecodable event"),
                }
            }
        }
    }

    async fn handle_inbound(
        &self,
        event: InboundEvent,
        identity: &DeviceIdentity,
        schemas: &DeviceSchemas,
    ) {
        match event {
            InboundEvent::Identify { session_token } => {
                debug!(%session_token, uuid = %identity.uuid, "Sending credential proof");
                let proof = events::identity_payload(identity, &session_token);
                if let Err(e) = self.transport.emit(names::OUT_IDENTITY, proof, None).await {
                    error!(error = %e, "Failed to send identity proof");
                }
            }
            InboundEvent::NotReady { status } => {
                warn!(%status, "Broker reports device not ready");
                if self.options.not_ready == NotReadyPolicy::Escalate {
                    self.plugin
                        .on_error(format!("device not ready: {status}"))
                        .await;
                }
            }
            InboundEvent::Ready { status } => {
                info!(%status, "Device ready");
                // The whoami ack arrives on the stream this handler runs
                // from, so the update flow gets its own task and the loop
                // keeps draining.
                let transport = Arc::clone(&self.transport);
                let acks = Arc::clone(&self.acks);
                let plugin = Arc::clone(&self.plugin);
                let identity = identity.clone();
                let schemas = schemas.clone();
                let ack_timeout = self.options.ack_timeout;
                tokio::spawn(async move {
                    if let Err(e) =
                        run_device_update(&*transport, &acks, &identity, &schemas, ack_timeout)
                            .await
                    {
                        warn!(error = %e, "Device update flow failed");
                    }
                    plugin.on_ready().await;
                });
            }
            InboundEvent::Config(raw) => {
                self.plugin.on_config(raw).await;
            }
            InboundEvent::Error { message } => {
                self.plugin.on_error(message).await;
            }
            InboundEvent::Message(payload) => match payload {
                MessagePayload::Params(value) | MessagePayload::Payload(value) => {
                    self.plugin.on_message(value).await;
                }
                MessagePayload::Unrecognized(envelope) => {
                    debug!(%envelope, "Message with neither params nor payload, dropping");
                }
            },
        }
    }

    /// Register a new device with the broker and persist its identity.
    ///
    /// Opens a dedicated short-lived session. The acknowledgement wait is
    /// bounded by [`ClientOptions::ack_timeout`], so this call always
    /// returns.
    pub async fn register(
        &self,
        name: &str,
        device: &Value,
        owner_uuid: &str,
        device_type: &str,
    ) -> ClientResult<DeviceIdentity> {
        let _activity = self.activity.try_lock().map_err(|_| ClientError::Busy)?;

        for (value, label) in [
            (name, "name"),
            (owner_uuid, "owner_uuid"),
            (device_type, "device_type"),
        ] {
            if value.is_empty() {
                return Err(ClientError::invalid_argument(format!(
                    "{label} must not be empty"
                )));
            }
        }
        let descriptor =
            build_descriptor(name, device, owner_uuid, device_type, &self.options.whitelist)?;

        let stored = self.store.read().await?;
        let config = ConnectionConfig::from_stored(&stored)?;
        let mut events = self
            .transport
            .open(&config)
            .await
            .map_err(ClientError::transport_setup)?;

        info!(%owner_uuid, %name, "Registering device");
        let result = self.drive_registration(&mut events, descriptor).await;

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Transport close failed after registration");
        }
        result
    }

    /// Emit `register` and pump the session's events until the correlated
    /// acknowledgement arrives or the wait bound elapses.
    async fn drive_registration(
        &self,
        events: &mut mpsc::Receiver<TransportEvent>,
        descriptor: Value,
    ) -> ClientResult<DeviceIdentity> {
        let (id, mut ack_rx) = self.acks.register();
        if let Err(e) = self
            .transport
            .emit(names::OUT_REGISTER, descriptor, Some(id))
            .await
        {
            self.acks.cancel(id);
            return Err(ClientError::transport(e));
        }

        let ack_timeout = self.options.ack_timeout;
        let waited = tokio::time::timeout(ack_timeout, async {
            loop {
                tokio::select! {
                    ack = &mut ack_rx => {
                        return ack.map_err(|_| {
                            ClientError::protocol_decode(
                                names::OUT_REGISTER,
                                "acknowledgement channel closed before a reply arrived",
                            )
                        });
                    }
                    event = events.recv() => {
                        match event {
                            Some(TransportEvent::Ack { id, payload }) => {
                                self.acks.fulfill(id, payload);
                            }
                            Some(other) => {
                                debug!(?other, "Ignoring event during registration");
                            }
                            None => {
                                return Err(ClientError::transport_setup(std::io::Error::new(
                                    std::io::ErrorKind::ConnectionAborted,
                                    "transport event stream ended during registration",
                                )));
                            }
                        }
                    }
                }
            }
        })
        .await;

        let ack = match waited {
            Ok(Ok(ack)) => ack,
            Ok(Err(e)) => {
                self.acks.cancel(id);
                return Err(e);
            }
            Err(_) => {
                self.acks.cancel(id);
                return Err(ClientError::AckTimeout {
                    event: names::OUT_REGISTER.to_string(),
                    timeout: ack_timeout,
                });
            }
        };

        let identity = events::decode_register_ack(&ack)?;
        self.store.write(&identity.uuid, &identity.token).await?;
        info!(uuid = %identity.uuid, "Device registered and persisted");
        Ok(identity)
    }

    /// Send a message to one or more devices.
    ///
    /// `targets` is the broker-side addressing value (an array of device
    /// uuids, or `"*"` for broadcast). Returns the broker's acknowledgement
    /// verbatim, uninterpreted.
    pub async fn send_message(&self, targets: Value, payload: Value) -> ClientResult<Value> {
        let envelope = events::message_envelope(targets, payload);
        self.emit_with_ack(names::OUT_MESSAGE, envelope).await
    }

    /// Send telemetry key/value data for this device. Returns the broker's
    /// acknowledgement verbatim.
    pub async fn send_telemetry(&self, payload: Value) -> ClientResult<Value> {
        if payload.is_null() {
            return Err(ClientError::invalid_argument(
                "telemetry payload must not be null",
            ));
        }
        self.emit_with_ack(names::OUT_DATA, payload).await
    }

    async fn emit_with_ack(&self, event: &str, payload: Value) -> ClientResult<Value> {
        let (id, ack_rx) = self.acks.register();
        if let Err(e) = self.transport.emit(event, payload, Some(id)).await {
            self.acks.cancel(id);
            return Err(ClientError::transport(e));
        }
        self.acks
            .await_ack(id, ack_rx, self.options.ack_timeout, event)
            .await
    }

    /// Number of requests still waiting for a broker acknowledgement
    pub fn outstanding_acks(&self) -> usize {
        self.acks.outstanding()
    }
}

impl<T, S> Drop for MeshbluClient<T, S>
where
    T: Transport + 'static,
    S: DeviceConfigStore,
{
    fn drop(&mut self) {
        // Release any task still blocked in connect; transport cleanup
        // happens there, not here.
        if let Ok(mut shutdown) = self.shutdown.lock() {
            if let Some(tx) = shutdown.take() {
                let _ = tx.send(true);
            }
        }
    }
}

/// Post-`ready` capability publication: ask the broker who we are, merge the
/// server-held options, and publish the supplied schemas so the device can
/// be configured remotely without resetting user-set option values.
async fn run_device_update<T: Transport>(
    transport: &T,
    acks: &AckTable,
    identity: &DeviceIdentity,
    schemas: &DeviceSchemas,
    ack_timeout: std::time::Duration,
) -> ClientResult<()> {
    let (id, ack_rx) = acks.register();
    if let Err(e) = transport
        .emit(names::OUT_WHOAMI, events::whoami_payload(&identity.uuid), Some(id))
        .await
    {
        acks.cancel(id);
        return Err(ClientError::transport(e));
    }

    if schemas.is_empty() {
        // The reply only matters for the update body; don't hold on_ready
        // hostage to it when there is nothing to publish.
        debug!("No schemas supplied, skipping device update");
        acks.cancel(id);
        return Ok(());
    }

    let reply = acks
        .await_ack(id, ack_rx, ack_timeout, names::OUT_WHOAMI)
        .await?;

    let options = events::extract_options(&reply);
    let body = events::update_payload(identity, schemas, options);
    transport
        .emit(names::OUT_UPDATE, body, None)
        .await
        .map_err(ClientError::transport)?;
    debug!(uuid = %identity.uuid, "Published device schemas");
    Ok(())
}
