//! Test support: in-process doubles for the transport, plugin, and store
//! seams. Compiled into the crate so integration tests and downstream
//! consumers can drive a client without a broker.

pub mod mocks;

pub use mocks::{MemoryConfigStore, MockPlugin, MockTransport, PluginCall};
