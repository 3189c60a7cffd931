//! Plugin callback surface
//!
//! A plugin is the consumer of one device's broker traffic. The client owns
//! the session; the plugin only reacts. Callbacks run on the client's event
//! loop task (or tasks it spawns), never on the caller's task, so
//! implementations must not assume mutual exclusion with their own code.

use async_trait::async_trait;
use serde_json::Value;

/// Callbacks a device plugin receives from the broker session
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The device is identified, authenticated, and will now receive messages
    async fn on_ready(&self);

    /// A message addressed to this device arrived. The value is the inner
    /// payload (`params` for webhook-style senders, `payload` for triggers),
    /// already unwrapped from the envelope.
    async fn on_message(&self, payload: Value);

    /// The broker reported an error for this device
    async fn on_error(&self, message: String);

    /// The device's broker-side configuration changed (e.g. a user edited
    /// options in the designer). Raw JSON, unparsed beyond the top level.
    async fn on_config(&self, config: Value);
}
