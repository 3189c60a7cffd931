//! TOML-file-backed credential store
//!
//! One file per named scope under a base directory, so each plugin keeps
//! its own credentials. Value names (`deviceuuid`, `devicetoken`,
//! `meshbluUrl`, `meshbluPort`) are kept for compatibility with existing
//! deployments.

use super::{DeviceConfigStore, StoreError, StoredConfig, DEFAULT_BROKER_PORT, DEFAULT_BROKER_URL};
use crate::config::DeviceIdentity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// On-disk shape of one scope file
#[derive(Debug, Default, Serialize, Deserialize)]
struct ScopeFile {
    #[serde(rename = "deviceuuid", skip_serializing_if = "Option::is_none")]
    device_uuid: Option<String>,
    #[serde(rename = "devicetoken", skip_serializing_if = "Option::is_none")]
    device_token: Option<String>,
    #[serde(rename = "meshbluUrl", skip_serializing_if = "Option::is_none")]
    meshblu_url: Option<String>,
    #[serde(rename = "meshbluPort", skip_serializing_if = "Option::is_none")]
    meshblu_port: Option<u16>,
}

/// File-backed [`DeviceConfigStore`], scoped by plugin name
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    scope: String,
}

impl FileConfigStore {
    /// Create a store rooted at `base_dir`, holding one `<scope>.toml` file.
    pub fn new(base_dir: impl AsRef<Path>, scope: &str) -> Result<Self, StoreError> {
        if scope.is_empty() {
            return Err(StoreError::MissingScope);
        }
        Ok(Self {
            path: base_dir.as_ref().join(format!("{scope}.toml")),
            scope: scope.to_string(),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<ScopeFile, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(scope = %self.scope, "No store file yet, reading as unconfigured");
                Ok(ScopeFile::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, file: &ScopeFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(file)?)?;
        Ok(())
    }
}

#[async_trait]
impl DeviceConfigStore for FileConfigStore {
    async fn read(&self) -> Result<StoredConfig, StoreError> {
        let file = self.load()?;

        // Identity is all-or-nothing. A file with only one of the two fields
        // is treated as unconfigured rather than half-registered.
        let identity = match (file.device_uuid, file.device_token) {
            (Some(uuid), Some(token)) => Some(DeviceIdentity { uuid, token }),
            (None, None) => None,
            _ => {
                warn!(scope = %self.scope, "Store holds a partial identity, ignoring it");
                None
            }
        };

        Ok(StoredConfig {
            identity,
            broker_url: file
                .meshblu_url
                .unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
            broker_port: file.meshblu_port.unwrap_or(DEFAULT_BROKER_PORT),
        })
    }

    async fn write(&self, uuid: &str, token: &str) -> Result<(), StoreError> {
        let mut file = self.load()?;
        file.device_uuid = Some(uuid.to_string());
        file.device_token = Some(token.to_string());
        self.save(&file)?;
        debug!(scope = %self.scope, "Wrote device credentials to store");
        Ok(())
    }
}
