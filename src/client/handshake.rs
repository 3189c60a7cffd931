//! Handshake state machine
//!
//! Pure transition logic for the identify → ready negotiation. The client's
//! event loop owns one state value and publishes it on a watch channel; all
//! transitions go through [`HandshakeState::on_inbound`] so the sequencing
//! is testable without a transport.

use crate::protocol::InboundEvent;

/// Connection negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// No session, the initial and terminal state
    #[default]
    Disconnected,
    /// Transport session opening, channel not yet up
    Connecting,
    /// Channel up, waiting for the broker to accept our credential proof
    Identifying,
    /// Authenticated; the device receives messages
    Ready,
    /// The broker refused the device (commonly an auth failure)
    NotReady,
}

impl HandshakeState {
    /// Transition taken when the transport reports its channel connected
    pub fn on_transport_connected(self) -> Self {
        match self {
            Self::Connecting | Self::Disconnected => Self::Identifying,
            // A reconnect-like signal mid-session restarts identification
            other => {
                debug_assert!(matches!(
                    other,
                    Self::Identifying | Self::Ready | Self::NotReady
                ));
                Self::Identifying
            }
        }
    }

    /// Transition taken for a decoded inbound event
    pub fn on_inbound(self, event: &InboundEvent) -> Self {
        match event {
            // The identify challenge itself does not advance the state;
            // the broker answers our proof with ready or notReady.
            InboundEvent::Identify { .. } => self,
            InboundEvent::Ready { .. } => Self::Ready,
            InboundEvent::NotReady { .. } => Self::NotReady,
            InboundEvent::Config(_) | InboundEvent::Error { .. } | InboundEvent::Message(_) => {
                self
            }
        }
    }

    /// Transition taken on explicit teardown
    pub fn on_teardown(self) -> Self {
        Self::Disconnected
    }

    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}
