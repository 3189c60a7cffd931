//! Wire protocol: inbound event decoding and outbound payload construction

pub mod descriptor;
pub mod events;

pub use descriptor::{build_descriptor, WhitelistDefault, WhitelistPolicy};
pub use events::{InboundEvent, MessagePayload};
