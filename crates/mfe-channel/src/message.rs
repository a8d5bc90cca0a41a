use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::TransportResult;

/// A change notice carried between contexts.
///
/// Encoded as internally tagged JSON, for example
/// `{"type":"set","key":"user","value":{...},"oldValue":null}`.
/// An absent old value omits `oldValue`; an explicit `null` is a stored
/// JSON null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BroadcastMessage {
    /// A key was written.
    Set {
        key: String,
        value: Value,
        #[serde(
            rename = "oldValue",
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "present"
        )]
        old_value: Option<Value>,
    },
    /// A key was removed.
    Delete {
        key: String,
        #[serde(
            rename = "oldValue",
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "present"
        )]
        old_value: Option<Value>,
    },
    /// Every key was removed.
    Clear,
}

/// Any present `oldValue`, including `null`, is `Some`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl BroadcastMessage {
    /// The key this message concerns, `None` for [`BroadcastMessage::Clear`].
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Set { key, .. } | Self::Delete { key, .. } => Some(key),
            Self::Clear => None,
        }
    }

    /// Short tag used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Delete { .. } => "delete",
            Self::Clear => "clear",
        }
    }

    /// Encode to the JSON wire form.
    pub fn encode(&self) -> TransportResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the JSON wire form.
    pub fn decode(data: &str) -> TransportResult<Self> {
        Ok(serde_json::from_str(data)?)
    }
}
