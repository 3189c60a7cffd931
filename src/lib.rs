//! Meshblu broker client
//!
//! A client library for the Meshblu device-messaging broker: it maintains a
//! persistent authenticated session, negotiates device identity, registers
//! new devices, relays inbound events to a pluggable handler, and sends
//! outbound messages and telemetry.
//!
//! The transport socket and the credential store are seams
//! ([`transport::Transport`], [`store::DeviceConfigStore`]): bring a socket
//! implementation, or drive the client with the doubles in [`testing`].
//!
//! # Overview
//!
//! - [`MeshbluClient`] owns one device's session. `connect` suspends the
//!   calling task until `disconnect` is called; `register` is a one-shot
//!   request/response flow that persists the new identity.
//! - [`Plugin`] is the callback surface a device implements:
//!   `on_ready`, `on_message`, `on_error`, `on_config`.
//! - [`client::HandshakeState`] exposes the identify → ready negotiation as
//!   an observable state machine.
//!
//! # Quick start
//!
//! ```no_run
//! use meshblu_client::testing::{MemoryConfigStore, MockPlugin, MockTransport};
//! use meshblu_client::{DeviceSchemas, MeshbluClient};
//!
//! # async fn demo() -> Result<(), meshblu_client::ClientError> {
//! let (plugin, _calls) = MockPlugin::new();
//! let store = MemoryConfigStore::with_identity("device-uuid", "device-token");
//! let client = MeshbluClient::new(MockTransport::new(), store, plugin);
//!
//! // Blocks until client.disconnect() is called from another task
//! client.connect(DeviceSchemas::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod plugin;
pub mod protocol;
pub mod store;
pub mod testing;
pub mod transport;

pub use client::{HandshakeState, MeshbluClient};
pub use config::{
    ClientOptions, ConnectionConfig, DeviceIdentity, DeviceSchemas, NotReadyPolicy,
};
pub use error::{ClientError, ClientResult};
pub use plugin::Plugin;
pub use protocol::{WhitelistDefault, WhitelistPolicy};
pub use store::{DeviceConfigStore, FileConfigStore, StoredConfig};
pub use transport::{AckId, Transport, TransportEvent};
