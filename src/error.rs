//! Error types for Meshblu client operations
//!
//! One taxonomy covers the whole client: argument validation, protocol
//! decoding, transport setup, persistence, and acknowledgement waits.
//! Handler-boundary failures inside a session are logged and swallowed;
//! everything that reaches a caller comes through [`ClientError`].

use std::time::Duration;
use thiserror::Error;

/// Main error type for Meshblu client operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// A required argument was missing or empty
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The device has no persisted identity yet; register it first
    #[error("Device is not configured yet (no uuid/token in the store)")]
    NotConfigured,

    /// Another connect or register is already active on this client
    #[error("Client is busy: a connect or register call is already active")]
    Busy,

    /// An inbound payload did not match any known event shape
    #[error("Protocol decode error for event '{event}': {message}")]
    ProtocolDecode { event: String, message: String },

    /// The transport session could not be established
    #[error("Transport setup failed")]
    TransportSetup(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An in-session transport operation failed
    #[error("Transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The broker URL in the store could not be parsed
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    /// No acknowledgement arrived within the configured wait
    #[error("No acknowledgement for '{event}' within {timeout:?}")]
    AckTimeout { event: String, timeout: Duration },

    /// The configuration store failed to read or write
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Create an invalid-argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a protocol decode error for a named event
    pub fn protocol_decode<S: Into<String>>(event: &str, message: S) -> Self {
        Self::ProtocolDecode {
            event: event.to_string(),
            message: message.into(),
        }
    }

    /// Wrap a transport error raised while establishing a session
    pub fn transport_setup<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TransportSetup(Box::new(source))
    }

    /// Wrap a transport error raised after the session was established
    pub fn transport<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(source))
    }
}

/// Result type for Meshblu client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_constructor() {
        let error = ClientError::invalid_argument("name must not be empty");
        assert!(matches!(error, ClientError::InvalidArgument { .. }));
        assert_eq!(
            error.to_string(),
            "Invalid argument: name must not be empty"
        );
    }

    #[test]
    fn test_protocol_decode_constructor() {
        let error = ClientError::protocol_decode("identify", "missing field `socketid`");
        assert!(matches!(error, ClientError::ProtocolDecode { .. }));
        let text = error.to_string();
        assert!(text.contains("identify"));
        assert!(text.contains("socketid"));
    }

    #[test]
    fn test_ack_timeout_display() {
        let error = ClientError::AckTimeout {
            event: "register".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(error.to_string().contains("register"));
    }

    #[test]
    fn test_store_error_conversion() {
        let store_error = crate::store::StoreError::MissingScope;
        let error: ClientError = store_error.into();
        assert!(matches!(error, ClientError::Store(_)));
    }

    #[test]
    fn test_all_variants_have_nonempty_display() {
        let errors = vec![
            ClientError::invalid_argument("x"),
            ClientError::NotConfigured,
            ClientError::Busy,
            ClientError::protocol_decode("ready", "bad shape"),
            ClientError::InvalidBrokerUrl("not-a-url".to_string()),
            ClientError::AckTimeout {
                event: "whoami".to_string(),
                timeout: Duration::from_secs(1),
            },
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
