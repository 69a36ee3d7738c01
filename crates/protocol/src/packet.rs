use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A packet received from the gateway, after header dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RfPlayerPacket {
    /// `ZIA--` text response (status lines, command acknowledgements).
    Simple(String),
    /// `ZIA33` JSON event frame.
    Json(Value),
}

impl RfPlayerPacket {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Simple(_) => None,
        }
    }

    pub fn as_simple(&self) -> Option<&str> {
        match self {
            Self::Simple(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// Reads `frame.header.<key>`.
pub fn header_field<'a>(event: &'a Value, key: &str) -> Option<&'a Value> {
    event.get("frame")?.get("header")?.get(key)
}

/// Reads `frame.infos.<key>`.
pub fn infos_field<'a>(event: &'a Value, key: &str) -> Option<&'a Value> {
    event.get("frame")?.get("infos")?.get(key)
}

/// Stringify a scalar JSON value the way the gateway prints it.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
