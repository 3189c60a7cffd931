//! Device credential persistence
//!
//! The broker hands out a uuid/token pair at registration time; the store
//! keeps them (plus the broker endpoint) under a named scope, one scope per
//! plugin identity. [`DeviceConfigStore`] is the seam: the file-backed
//! implementation in [`file`] is the default, tests use the in-memory one
//! from `crate::testing`.

use crate::config::DeviceIdentity;
use async_trait::async_trait;
use thiserror::Error;

pub mod file;

pub use file::FileConfigStore;

/// Default broker endpoint used when the store has no override
pub const DEFAULT_BROKER_URL: &str = "wss://meshblu.octoblu.com";

/// Default broker port used when the store has no override
pub const DEFAULT_BROKER_PORT: u16 = 443;

/// Everything the store knows about one device scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConfig {
    /// `Some` iff both uuid and token are persisted; a scope never holds a
    /// partial identity
    pub identity: Option<DeviceIdentity>,
    pub broker_url: String,
    pub broker_port: u16,
}

impl StoredConfig {
    /// A scope with no identity and default broker endpoint
    pub fn unconfigured() -> Self {
        Self {
            identity: None,
            broker_url: DEFAULT_BROKER_URL.to_string(),
            broker_port: DEFAULT_BROKER_PORT,
        }
    }

    /// Whether this device has been registered
    pub fn is_configured(&self) -> bool {
        self.identity.is_some()
    }
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse stored config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Store scope name must not be empty")]
    MissingScope,
}

/// Persists and retrieves one device's credentials and broker endpoint
#[async_trait]
pub trait DeviceConfigStore: Send + Sync {
    /// Read the scope's current values. A missing scope is not an error:
    /// it reads as [`StoredConfig::unconfigured`].
    async fn read(&self) -> Result<StoredConfig, StoreError>;

    /// Persist a freshly registered identity. Uuid and token are written
    /// together; broker endpoint values are left untouched.
    async fn write(&self, uuid: &str, token: &str) -> Result<(), StoreError>;
}
