//! Registration descriptor construction
//!
//! A descriptor is the device record sent with a `register` request:
//! caller-supplied fields plus the mandated name/type/owner fields and four
//! access-control whitelists. Whitelist defaults are a policy value, not
//! hardcoded, because deployed clients have shipped with two different
//! default sets.

use crate::error::ClientError;
use serde_json::{json, Map, Value};

/// Default value for one whitelist field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistDefault {
    /// Only the owning account: a one-element uuid array
    Owners,
    /// Anyone: the `"*"` wildcard string
    Everyone,
}

impl WhitelistDefault {
    fn to_value(self, owner_uuid: &str) -> Value {
        match self {
            Self::Owners => json!([owner_uuid]),
            Self::Everyone => json!("*"),
        }
    }
}

/// Per-field whitelist defaults applied when the caller omits a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistPolicy {
    pub configure: WhitelistDefault,
    pub discover: WhitelistDefault,
    pub receive: WhitelistDefault,
    pub send: WhitelistDefault,
}

impl Default for WhitelistPolicy {
    /// Owners may configure and discover; anyone may send and receive.
    fn default() -> Self {
        Self {
            configure: WhitelistDefault::Owners,
            discover: WhitelistDefault::Owners,
            receive: WhitelistDefault::Everyone,
            send: WhitelistDefault::Everyone,
        }
    }
}

impl WhitelistPolicy {
    /// The variant some deployments used: configuration open to anyone,
    /// discovery still owners-only.
    pub fn open_configure() -> Self {
        Self {
            configure: WhitelistDefault::Everyone,
            ..Self::default()
        }
    }
}

const WHITELIST_FIELDS: [(&str, fn(&WhitelistPolicy) -> WhitelistDefault); 4] = [
    ("configureWhitelist", |p| p.configure),
    ("discoverWhitelist", |p| p.discover),
    ("receiveWhitelist", |p| p.receive),
    ("sendWhitelist", |p| p.send),
];

/// Build the descriptor for a `register` request.
///
/// `device` supplies the caller's custom fields. Mandated fields (`name`,
/// `type`, `owner`) overwrite whatever the caller put there; whitelist
/// fields are defaulted only when absent; caller values are never touched.
pub fn build_descriptor(
    name: &str,
    device: &Value,
    owner_uuid: &str,
    device_type: &str,
    policy: &WhitelistPolicy,
) -> Result<Value, ClientError> {
    let mut descriptor: Map<String, Value> = match device {
        Value::Object(fields) => fields.clone(),
        other => {
            return Err(ClientError::invalid_argument(format!(
                "device must be a JSON object, got {other}"
            )))
        }
    };

    descriptor.insert("name".to_string(), json!(name));
    descriptor.insert("type".to_string(), json!(format!("device:{device_type}")));
    descriptor.insert("owner".to_string(), json!([owner_uuid]));

    for (field, pick) in WHITELIST_FIELDS {
        if !descriptor.contains_key(field) {
            descriptor.insert(field.to_string(), pick(policy).to_value(owner_uuid));
        }
    }

    Ok(Value::Object(descriptor))
}
