//! JSON wire envelopes exchanged between the hub and its clients.
//!
//! One envelope per WebSocket text frame, discriminated by a `type` field.
//! Decoding is deliberately liberal about field contents: role and target
//! names travel as plain strings so that an unknown role surfaces as a
//! protocol error from the hub, not as a codec failure.

use crate::role::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error produced when an inbound frame cannot be decoded at all.
///
/// Only malformed JSON and non-object values qualify. A well-formed object
/// with an unrecognized `type` is NOT a decode error — it folds to
/// [`Envelope::Unknown`] and is rejected at the routing layer instead.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame was not valid JSON.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// The frame was valid JSON but not an object.
    #[error("payload must be a json object")]
    NotAnObject,
}

/// One typed message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// First envelope on every connection: claim a role.
    Register {
        /// Requested role name; validated by the hub, not the codec.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Shared-secret token; required for role "b" only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Hub acknowledgement of a successful registration.
    Registered {
        /// The role that was granted.
        role: Role,
    },
    /// Instruction relayed from role "b" to role "c".
    Command {
        /// Opaque command string; forwarded verbatim, never validated.
        #[serde(default)]
        command: Option<String>,
    },
    /// Payload relayed between roles "a" and "b".
    Message {
        /// Target role; present on inbound envelopes only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        /// Originating role; stamped by the hub on outbound envelopes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Role>,
        /// Arbitrary payload; null when absent.
        #[serde(default)]
        payload: Value,
    },
    /// Hub → "c" notification that a "b" connection registered.
    BConnected {
        /// The token "b" registered with. Always present, null when absent.
        #[serde(default)]
        token: Option<String>,
    },
    /// Hub → "c" notification that the "b" connection went away.
    BDisconnected {
        /// The token the departed "b" had registered with, if any.
        #[serde(default)]
        token: Option<String>,
    },
    /// Protocol rejection sent back to the offending connection.
    Error {
        /// Human-readable reason.
        error: String,
    },
    /// Any well-formed object whose `type` the hub does not recognize.
    ///
    /// Never sent on the wire.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// Registration request for `role` with an optional token.
    #[must_use]
    pub fn register(role: Role, token: Option<String>) -> Self {
        Self::Register {
            role: Some(role.as_str().to_owned()),
            token,
        }
    }

    /// Acknowledgement for a granted registration.
    #[must_use]
    pub fn registered(role: Role) -> Self {
        Self::Registered { role }
    }

    /// Command envelope as delivered to role "c".
    #[must_use]
    pub fn command(command: Option<String>) -> Self {
        Self::Command { command }
    }

    /// Inbound message envelope targeting `to`.
    #[must_use]
    pub fn message_to(to: Role, payload: Value) -> Self {
        Self::Message {
            to: Some(to.as_str().to_owned()),
            from: None,
            payload,
        }
    }

    /// Outbound message envelope as forwarded by the hub.
    #[must_use]
    pub fn message_from(from: Role, payload: Value) -> Self {
        Self::Message {
            to: None,
            from: Some(from),
            payload,
        }
    }

    /// Presence notification for a freshly registered "b".
    #[must_use]
    pub fn b_connected(token: Option<String>) -> Self {
        Self::BConnected { token }
    }

    /// Presence notification for a departed "b".
    #[must_use]
    pub fn b_disconnected(token: Option<String>) -> Self {
        Self::BDisconnected { token }
    }

    /// Protocol rejection with a human-readable reason.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            error: reason.into(),
        }
    }

    /// Decode one wire frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed JSON or a non-object value.
    /// An object with an unrecognized or missing `type`, or with fields of
    /// unexpected shape, decodes as [`Envelope::Unknown`].
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        Ok(serde_json::from_value(value).unwrap_or(Envelope::Unknown))
    }

    /// Encode for the wire.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error, which cannot occur for
    /// envelopes built from decoded wire data.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_register_with_token() {
        let env = Envelope::decode(r#"{"type":"register","role":"b","token":"demo-token"}"#)
            .unwrap();
        assert_eq!(
            env,
            Envelope::Register {
                role: Some("b".into()),
                token: Some("demo-token".into()),
            }
        );
    }

    #[test]
    fn decodes_register_without_role() {
        let env = Envelope::decode(r#"{"type":"register"}"#).unwrap();
        assert_eq!(
            env,
            Envelope::Register {
                role: None,
                token: None,
            }
        );
    }

    #[test]
    fn decodes_message_with_missing_payload_as_null() {
        let env = Envelope::decode(r#"{"type":"message","to":"a"}"#).unwrap();
        assert_eq!(
            env,
            Envelope::Message {
                to: Some("a".into()),
                from: None,
                payload: Value::Null,
            }
        );
    }

    #[test]
    fn unknown_type_folds_to_unknown() {
        let env = Envelope::decode(r#"{"type":"subscribe","channel":"x"}"#).unwrap();
        assert_eq!(env, Envelope::Unknown);
    }

    #[test]
    fn missing_type_folds_to_unknown() {
        let env = Envelope::decode(r#"{"role":"a"}"#).unwrap();
        assert_eq!(env, Envelope::Unknown);
    }

    #[test]
    fn malformed_field_shape_folds_to_unknown() {
        // `to` must be a string; a number is not a decode error either.
        let env = Envelope::decode(r#"{"type":"message","to":5,"payload":1}"#).unwrap();
        assert_eq!(env, Envelope::Unknown);
    }

    #[test]
    fn non_object_is_a_decode_error() {
        assert!(matches!(
            Envelope::decode("[1,2,3]"),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            Envelope::decode("\"hello\""),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        assert!(matches!(
            Envelope::decode("{not json"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn outbound_message_carries_from_and_omits_to() {
        let env = Envelope::message_from(Role::A, json!("hi"));
        let encoded = env.to_json().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["from"], "a");
        assert_eq!(value["payload"], "hi");
        assert!(value.get("to").is_none());
    }

    #[test]
    fn b_disconnected_serializes_null_token() {
        let encoded = Envelope::b_disconnected(None).to_json().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "b_disconnected");
        assert!(value.get("token").is_some());
        assert_eq!(value["token"], Value::Null);
    }

    #[test]
    fn error_envelope_carries_reason() {
        let encoded = Envelope::error("invalid target").to_json().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"], "invalid target");
    }
}
