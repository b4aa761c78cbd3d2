//! The `{ type, payload }` envelope and its JSON wire form.
//!
//! The codec is strict in one direction only: it never substitutes defaults.
//! A frame without a string `type` is a [`Error::Decode`]; an absent
//! `payload` decodes to `None` while an explicit `null` payload decodes to
//! `Some(Value::Null)`, so every envelope survives an encode/decode cycle
//! unchanged. Payload shape is owned by the server and only checked when a
//! typed view such as [`Envelope::snapshot`] is requested.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::payload::{ParticleSpec, ServerError, Snapshot};

/// Envelope types this crate knows by name. Any other string is still a
/// valid `type`.
pub mod kinds {
    /// Client request for a full-state snapshot.
    pub const GET_SNAPSHOT: &str = "getSnapshot";
    /// Client request to add a particle.
    pub const CREATE_PARTICLE: &str = "createParticle";
    /// Server full-state snapshot.
    pub const SNAPSHOT: &str = "snapshot";
    /// Server error report.
    pub const ERROR: &str = "error";
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminator, an open string domain.
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-dependent payload.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub payload: Option<Value>,
}

/// Keep an explicit `null` as `Some(Value::Null)`; only absence is `None`.
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Envelope without a payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// Envelope with a payload.
    #[must_use]
    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
        }
    }

    /// `{"type":"getSnapshot"}`
    #[must_use]
    pub fn get_snapshot() -> Self {
        Self::new(kinds::GET_SNAPSHOT)
    }

    /// `{"type":"createParticle","payload":{"type":..,"position":{..}}}`
    #[must_use]
    pub fn create_particle(spec: &ParticleSpec) -> Self {
        Self::with_payload(
            kinds::CREATE_PARTICLE,
            json!({
                "type": spec.species,
                "position": {
                    "x": spec.position.x,
                    "y": spec.position.y,
                    "z": spec.position.z,
                },
            }),
        )
    }

    /// Returns `true` if this envelope's `type` equals `kind`.
    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Parse the payload of a `snapshot` envelope.
    ///
    /// # Errors
    ///
    /// `Error::Decode` if the envelope is not a snapshot, has no payload, or
    /// the payload lacks `particles`, `simulationTime` or `metrics.totalEnergy`.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.typed_payload(kinds::SNAPSHOT)
    }

    /// Parse the payload of an `error` envelope.
    ///
    /// # Errors
    ///
    /// `Error::Decode` if the envelope is not an error or lacks `message`.
    pub fn server_error(&self) -> Result<ServerError> {
        self.typed_payload(kinds::ERROR)
    }

    fn typed_payload<T: serde::de::DeserializeOwned>(&self, kind: &str) -> Result<T> {
        if !self.is(kind) {
            return Err(Error::Decode(format!(
                "expected a {} envelope, got {}",
                kind, self.kind
            )));
        }
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| Error::Decode(format!("{} envelope has no payload", kind)))?;
        T::deserialize(payload)
            .map_err(|e| Error::Decode(format!("invalid {} payload: {}", kind, e)))
    }
}

impl fmt::Display for Envelope {
    /// Envelope type plus a short payload preview.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 100;
        match &self.payload {
            None => write!(f, "{}", self.kind),
            Some(payload) => {
                let text = payload.to_string();
                if text.chars().count() > PREVIEW {
                    let cut: String = text.chars().take(PREVIEW).collect();
                    write!(f, "{}: {}...", self.kind, cut)
                } else {
                    write!(f, "{}: {}", self.kind, text)
                }
            }
        }
    }
}

/// Serialize an envelope to its JSON text.
///
/// # Errors
///
/// `Error::Encode` if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| Error::Encode(e.to_string()))
}

/// Deserialize one envelope from frame bytes.
///
/// # Errors
///
/// `Error::Decode` if the bytes are not UTF-8 JSON, not a JSON object, or
/// lack a string `type` field.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let value: Value = serde_json::from_slice(bytes)?;
    if !value.is_object() {
        return Err(Error::Decode(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }
    Envelope::deserialize(value).map_err(|e| Error::Decode(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Position;

    #[test]
    fn test_encode_get_snapshot() {
        let text = encode(&Envelope::get_snapshot()).unwrap();
        assert_eq!(text, r#"{"type":"getSnapshot"}"#);
    }

    #[test]
    fn test_encode_create_particle() {
        let spec = ParticleSpec::new("proton", Position::new(5.0, 5.0, 5.0));
        let text = encode(&Envelope::create_particle(&spec)).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "createParticle");
        assert_eq!(value["payload"]["type"], "proton");
        assert_eq!(value["payload"]["position"]["x"], 5.0);
        assert_eq!(value["payload"]["position"]["z"], 5.0);
    }

    #[test]
    fn test_decode_without_payload() {
        let env = decode(br#"{"type":"tick"}"#).unwrap();
        assert_eq!(env.kind, "tick");
        assert_eq!(env.payload, None);
    }

    #[test]
    fn test_decode_keeps_explicit_null() {
        let env = decode(br#"{"type":"tick","payload":null}"#).unwrap();
        assert_eq!(env.payload, Some(Value::Null));
        assert_eq!(decode(encode(&env).unwrap().as_bytes()).unwrap(), env);
    }

    #[test]
    fn test_decode_ignores_unknown_top_level_fields() {
        let env = decode(br#"{"type":"tick","seq":4}"#).unwrap();
        assert_eq!(env, Envelope::new("tick"));
    }

    #[test]
    fn test_decode_failures() {
        let inputs: [&[u8]; 8] = [
            b"not json",
            br#"{"payload":{}}"#,
            br#"{"type":7}"#,
            br#"{"type":null}"#,
            br#"["snapshot",{}]"#,
            br#""snapshot""#,
            &[0xff, 0xfe, 0x00],
            b"",
        ];
        for input in inputs {
            assert!(
                matches!(decode(input), Err(Error::Decode(_))),
                "{:?} should not decode",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_snapshot_view() {
        let env = decode(
            br#"{"type":"snapshot","payload":{"particles":[{"id":1},{"id":2}],
                "simulationTime":1.25,"metrics":{"totalEnergy":938.27,"momentum":0.0}}}"#,
        )
        .unwrap();
        let snapshot = env.snapshot().unwrap();
        assert_eq!(snapshot.particle_count(), 2);
        assert_eq!(snapshot.simulation_time, 1.25);
        assert_eq!(snapshot.metrics.total_energy, 938.27);
        assert_eq!(snapshot.metrics.other["momentum"], 0.0);
    }

    #[test]
    fn test_snapshot_view_rejects_missing_fields() {
        let env = decode(br#"{"type":"snapshot","payload":{"particles":[]}}"#).unwrap();
        assert!(matches!(env.snapshot(), Err(Error::Decode(msg)) if msg.contains("simulationTime")));

        let env = Envelope::new("snapshot");
        assert!(matches!(env.snapshot(), Err(Error::Decode(msg)) if msg.contains("no payload")));

        let env = Envelope::new("error");
        assert!(matches!(env.snapshot(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_server_error_view() {
        let env = decode(br#"{"type":"error","payload":{"message":"Unknown particle type"}}"#)
            .unwrap();
        assert_eq!(env.server_error().unwrap().message, "Unknown particle type");
    }

    #[test]
    fn test_display_truncates_payload() {
        let env = Envelope::with_payload("blob", Value::String("x".repeat(500)));
        let shown = env.to_string();
        assert!(shown.starts_with("blob: \"xxx"));
        assert!(shown.ends_with("..."));
        assert!(shown.len() < 120);
        assert_eq!(Envelope::get_snapshot().to_string(), "getSnapshot");
    }
}
