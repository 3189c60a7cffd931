//! Client-side configuration types
//!
//! [`ConnectionConfig`] is derived from the persisted store values at
//! connect/register time and stays immutable for the life of a session.
//! [`ClientOptions`] carries the client's behavior tunables:
//! acknowledgement timeout, `notReady` escalation, and whitelist defaults.

use crate::error::ClientError;
use crate::protocol::WhitelistPolicy;
use crate::store::StoredConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// A registered device's credentials, always whole: uuid and token travel
/// together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub uuid: String,
    pub token: String,
}

/// Parameters for one transport session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Broker endpoint, e.g. `wss://meshblu.octoblu.com`
    pub url: String,
    pub port: u16,
    pub secure: bool,
    pub ignore_cert_validation: bool,
}

impl ConnectionConfig {
    /// Build a session config from persisted store values.
    ///
    /// The broker URL is validated up front so a malformed store entry fails
    /// before a session is opened. `secure` and `ignore_cert_validation`
    /// match the broker's TLS expectations for device channels.
    pub fn from_stored(stored: &StoredConfig) -> Result<Self, ClientError> {
        Url::parse(&stored.broker_url)
            .map_err(|_| ClientError::InvalidBrokerUrl(stored.broker_url.clone()))?;

        Ok(Self {
            url: stored.broker_url.clone(),
            port: stored.broker_port,
            secure: true,
            ignore_cert_validation: true,
        })
    }
}

/// Whether a `notReady` status should reach the plugin's error path.
///
/// The broker uses `notReady` for authentication failures (e.g. a 401
/// status) as well as transient states, so escalation is a policy choice
/// rather than hardcoded behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotReadyPolicy {
    /// Log the status and carry on (historical behavior)
    #[default]
    LogOnly,
    /// Also forward the status through `Plugin::on_error`
    Escalate,
}

/// Capability schemas published after the broker reports `ready`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSchemas {
    /// JSON schema describing messages this device accepts
    pub message_schema: Option<serde_json::Value>,
    /// JSON schema describing this device's configurable options
    pub options_schema: Option<serde_json::Value>,
}

impl DeviceSchemas {
    pub fn is_empty(&self) -> bool {
        self.message_schema.is_none() && self.options_schema.is_none()
    }
}

/// Client behavior tunables
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on every acknowledgement wait (register, whoami, message, data)
    pub ack_timeout: Duration,
    pub not_ready: NotReadyPolicy,
    /// Default whitelist fields applied to registration descriptors
    pub whitelist: WhitelistPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            ack_timeout: default_ack_timeout(),
            not_ready: NotReadyPolicy::default(),
            whitelist: WhitelistPolicy::default(),
        }
    }
}

fn default_ack_timeout() -> Duration {
    Duration::from_secs(30)
}
