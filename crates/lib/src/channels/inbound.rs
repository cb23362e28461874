//! Inbound message from the messaging channel, and the validator that builds it from an
//! untrusted request body.

use crate::config::ValidationMode;
use crate::error::RelayError;
use serde_json::{Map, Value};

/// A validated guest message. Lives for one request only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message: String,
    pub sender: String,
    pub timestamp: String,
}

/// Required fields in the order they are checked; the first failing one is reported.
const FIELDS: [&str; 3] = ["message", "sender", "timestamp"];

/// Parses request bodies into [`InboundMessage`]. Message length is not capped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    mode: ValidationMode,
}

impl Validator {
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    /// Parse raw bytes. Empty body counts as `{}`; non-JSON bytes are a malformed request.
    pub fn parse_body(&self, body: &[u8]) -> Result<InboundMessage, RelayError> {
        let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(body).map_err(|e| RelayError::MalformedRequest(e.to_string()))?
        };
        self.validate(&value)
    }

    /// Check an already-parsed JSON value.
    pub fn validate(&self, value: &Value) -> Result<InboundMessage, RelayError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RelayError::Validation("request body must be a JSON object".to_string()))?;
        let mut out = [String::new(), String::new(), String::new()];
        for (slot, field) in out.iter_mut().zip(FIELDS) {
            *slot = self.field(obj, field)?;
        }
        let [message, sender, timestamp] = out;
        Ok(InboundMessage {
            message,
            sender,
            timestamp,
        })
    }

    fn field(&self, obj: &Map<String, Value>, name: &str) -> Result<String, RelayError> {
        let text = match (obj.get(name), self.mode) {
            (None | Some(Value::Null), _) => None,
            (Some(Value::String(s)), _) => Some(s.clone()),
            (Some(Value::Number(n)), ValidationMode::Lenient) => Some(n.to_string()),
            (Some(Value::Bool(b)), ValidationMode::Lenient) => Some(b.to_string()),
            (Some(_), _) => {
                return Err(RelayError::Validation(format!("{} must be a string", name)));
            }
        };
        text.filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::Validation(format!("{} is required", name)))
    }
}
