//! Inbound event decoding and outbound payload builders
//!
//! Pure functions only: everything here is JSON in, typed value (or JSON)
//! out, so the whole wire surface is testable without a transport.

use crate::config::{DeviceIdentity, DeviceSchemas};
use crate::error::ClientError;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Inbound event names the client subscribes to
pub mod names {
    pub const IDENTIFY: &str = "identify";
    pub const NOT_READY: &str = "notReady";
    pub const READY: &str = "ready";
    pub const CONFIG: &str = "config";
    pub const ERROR: &str = "error";
    pub const MESSAGE: &str = "message";

    pub const OUT_IDENTITY: &str = "identity";
    pub const OUT_WHOAMI: &str = "whoami";
    pub const OUT_UPDATE: &str = "update";
    pub const OUT_REGISTER: &str = "register";
    pub const OUT_MESSAGE: &str = "message";
    pub const OUT_DATA: &str = "data";
}

/// One decoded broker event, exactly one tag per received payload
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The broker asks this socket to prove its identity
    Identify { session_token: String },
    /// The device will not receive messages; status may carry an auth code
    NotReady { status: Value },
    /// The device is authenticated and will receive messages
    Ready { status: Value },
    /// New broker-side device configuration, raw
    Config(Value),
    /// A broker-reported error
    Error { message: String },
    /// A message addressed to this device
    Message(MessagePayload),
}

#[derive(Debug, Deserialize)]
struct IdentifyPayload {
    // The broker names the per-connection token after the socket id
    #[serde(rename = "socketid")]
    session_token: String,
}

impl InboundEvent {
    /// Decode a named event's payload into its typed form.
    ///
    /// Unknown event names and malformed payloads are decode errors; the
    /// session-level handler logs them and keeps the session alive.
    pub fn decode(name: &str, payload: Value) -> Result<Self, ClientError> {
        match name {
            names::IDENTIFY => {
                let identify: IdentifyPayload = serde_json::from_value(payload)
                    .map_err(|e| ClientError::protocol_decode(name, e.to_string()))?;
                Ok(Self::Identify {
                    session_token: identify.session_token,
                })
            }
            names::NOT_READY => Ok(Self::NotReady {
                status: payload.get("status").cloned().unwrap_or(Value::Null),
            }),
            names::READY => Ok(Self::Ready {
                status: payload.get("status").cloned().unwrap_or(Value::Null),
            }),
            names::CONFIG => Ok(Self::Config(payload)),
            names::ERROR => {
                // Broker errors usually carry {message}; fall back to the
                // whole payload so nothing is lost on odd shapes.
                let message = match payload.get("message").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => payload.to_string(),
                };
                Ok(Self::Error { message })
            }
            names::MESSAGE => Ok(Self::Message(MessagePayload::decode(payload))),
            other => Err(ClientError::protocol_decode(
                other,
                "unrecognized event name",
            )),
        }
    }
}

/// The payload portion of an inbound `message` envelope.
///
/// Webhook senders put the payload in `params`, triggers put it in
/// `payload`; `params` wins when both are present. Anything else is
/// `Unrecognized`, kept observable instead of silently dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Params(Value),
    Payload(Value),
    Unrecognized(Value),
}

impl MessagePayload {
    pub fn decode(envelope: Value) -> Self {
        if let Some(params) = envelope.get("params") {
            return Self::Params(params.clone());
        }
        if let Some(payload) = envelope.get("payload") {
            return Self::Payload(payload.clone());
        }
        Self::Unrecognized(envelope)
    }

    /// The value to hand the plugin, if this shape is dispatchable
    pub fn dispatchable(&self) -> Option<&Value> {
        match self {
            Self::Params(value) | Self::Payload(value) => Some(value),
            Self::Unrecognized(_) => None,
        }
    }
}

/// Acknowledgement payload of a `register` request
#[derive(Debug, Deserialize)]
struct RegisterAck {
    uuid: String,
    token: String,
}

/// Decode a registration acknowledgement into the new device identity
pub fn decode_register_ack(payload: &Value) -> Result<DeviceIdentity, ClientError> {
    let ack: RegisterAck = serde_json::from_value(payload.clone())
        .map_err(|e| ClientError::protocol_decode(names::OUT_REGISTER, e.to_string()))?;
    Ok(DeviceIdentity {
        uuid: ack.uuid,
        token: ack.token,
    })
}

/// Credential proof sent in answer to `identify`
pub fn identity_payload(identity: &DeviceIdentity, session_token: &str) -> Value {
    json!({
        "uuid": identity.uuid,
        "token": identity.token,
        "socketid": session_token,
    })
}

/// `whoami` request body
pub fn whoami_payload(uuid: &str) -> Value {
    json!({ "uuid": uuid })
}

/// Server-held options from a `whoami` reply, defaulting to an empty object
pub fn extract_options(whoami_reply: &Value) -> Value {
    match whoami_reply.get("options") {
        Some(options) if !options.is_null() => options.clone(),
        _ => Value::Object(Map::new()),
    }
}

/// `update` request body: schemas to publish plus the server-held options,
/// echoed back so user-set values survive the update
pub fn update_payload(
    identity: &DeviceIdentity,
    schemas: &DeviceSchemas,
    options: Value,
) -> Value {
    let mut body = Map::new();
    body.insert("uuid".to_string(), json!(identity.uuid));
    body.insert("token".to_string(), json!(identity.token));
    if let Some(message_schema) = &schemas.message_schema {
        body.insert("messageSchema".to_string(), message_schema.clone());
    }
    if let Some(options_schema) = &schemas.options_schema {
        body.insert("optionsSchema".to_string(), options_schema.clone());
    }
    body.insert("options".to_string(), options);
    Value::Object(body)
}

/// Outbound `message` envelope
pub fn message_envelope(targets: Value, payload: Value) -> Value {
    json!({
        "devices": targets,
        "payload": payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_identify() {
        let event = InboundEvent::decode(names::IDENTIFY, json!({"socketid": "s1"})).unwrap();
        assert_eq!(
            event,
            InboundEvent::Identify {
                session_token: "s1".to_string()
            }
        );
    }

    #[test]
    fn test_decode_identify_missing_token_is_error() {
        let result = InboundEvent::decode(names::IDENTIFY, json!({}));
        assert!(matches!(result, Err(ClientError::ProtocolDecode { .. })));
    }

    #[test]
    fn test_decode_ready_and_not_ready_status() {
        let ready = InboundEvent::decode(names::READY, json!({"status": "200"})).unwrap();
        assert_eq!(
            ready,
            InboundEvent::Ready {
                status: json!("200")
            }
        );

        // Auth failures arrive as numeric statuses
        let not_ready = InboundEvent::decode(names::NOT_READY, json!({"status": 401})).unwrap();
        assert_eq!(
            not_ready,
            InboundEvent::NotReady { status: json!(401) }
        );
    }

    #[test]
    fn test_decode_error_prefers_message_field() {
        let event = InboundEvent::decode(names::ERROR, json!({"message": "boom"})).unwrap();
        assert_eq!(
            event,
            InboundEvent::Error {
                message: "boom".to_string()
            }
        );

        let fallback = InboundEvent::decode(names::ERROR, json!({"code": 500})).unwrap();
        match fallback {
            InboundEvent::Error { message } => assert!(message.contains("500")),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_config_is_raw() {
        let raw = json!({"options": {"interval": 5}});
        let event = InboundEvent::decode(names::CONFIG, raw.clone()).unwrap();
        assert_eq!(event, InboundEvent::Config(raw));
    }

    #[test]
    fn test_decode_unknown_event_name() {
        let result = InboundEvent::decode("mystery", json!({}));
        assert!(matches!(result, Err(ClientError::ProtocolDecode { .. })));
    }

    #[test]
    fn test_message_payload_params_only() {
        let decoded = MessagePayload::decode(json!({"params": {"a": 1}}));
        assert_eq!(decoded, MessagePayload::Params(json!({"a": 1})));
        assert_eq!(decoded.dispatchable(), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_message_payload_payload_only() {
        let decoded = MessagePayload::decode(json!({"payload": {"b": 2}}));
        assert_eq!(decoded, MessagePayload::Payload(json!({"b": 2})));
    }

    #[test]
    fn test_message_payload_params_wins_over_payload() {
        let decoded = MessagePayload::decode(json!({"params": {"a": 1}, "payload": {"b": 2}}));
        assert_eq!(decoded.dispatchable(), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_message_payload_neither_is_unrecognized() {
        let envelope = json!({"fromUuid": "u9"});
        let decoded = MessagePayload::decode(envelope.clone());
        assert_eq!(decoded, MessagePayload::Unrecognized(envelope));
        assert_eq!(decoded.dispatchable(), None);
    }

    #[test]
    fn test_identity_payload_shape() {
        let identity = DeviceIdentity {
            uuid: "u1".to_string(),
            token: "t1".to_string(),
        };
        assert_eq!(
            identity_payload(&identity, "s1"),
            json!({"uuid": "u1", "token": "t1", "socketid": "s1"})
        );
    }

    #[test]
    fn test_extract_options_defaults_to_empty_object() {
        assert_eq!(extract_options(&json!({})), json!({}));
        assert_eq!(extract_options(&json!({"options": null})), json!({}));
        assert_eq!(
            extract_options(&json!({"options": {"x": 1}})),
            json!({"x": 1})
        );
    }

    #[test]
    fn test_update_payload_includes_only_supplied_schemas() {
        let identity = DeviceIdentity {
            uuid: "u1".to_string(),
            token: "t1".to_string(),
        };
        let schemas = DeviceSchemas {
            message_schema: Some(json!({"type": "object"})),
            options_schema: None,
        };

        let body = update_payload(&identity, &schemas, json!({"x": 1}));
        assert_eq!(body["uuid"], "u1");
        assert_eq!(body["token"], "t1");
        assert_eq!(body["messageSchema"], json!({"type": "object"}));
        assert!(body.get("optionsSchema").is_none());
        assert_eq!(body["options"], json!({"x": 1}));
    }

    #[test]
    fn test_message_envelope_shape() {
        let envelope = message_envelope(json!(["u2"]), json!({"on": true}));
        assert_eq!(
            envelope,
            json!({"devices": ["u2"], "payload": {"on": true}})
        );
    }

    #[test]
    fn test_decode_register_ack() {
        let identity = decode_register_ack(&json!({"uuid": "d1", "token": "t1"})).unwrap();
        assert_eq!(identity.uuid, "d1");
        assert_eq!(identity.token, "t1");

        assert!(decode_register_ack(&json!({"uuid": "d1"})).is_err());
    }
}
