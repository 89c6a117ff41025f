//! The JSON payload carried by the messages we consume.
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// An application message, as published on the exchange.
///
/// ```json
/// { "correlation_id": "abc-1", "action_type": "create", "data": { "ID": "rec-42" } }
/// ```
///
/// Keys are matched case-insensitively, an exact match winning over the others. Fields that are
/// missing or `null` are left empty. A field with the wrong type, or a payload that is not a JSON
/// object, makes the whole message invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Message {
    pub correlation_id: String,
    pub action_type: String,
    pub data: Record,
}

/// The record a [`Message`] refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    #[serde(rename = "ID")]
    pub id: String,
}

impl Message {
    /// Decode a message from the raw body of a delivery.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        let fields = as_object(serde_json::from_slice(body)?)?;
        Ok(Self {
            correlation_id: string_field(&fields, "correlation_id")?,
            action_type: string_field(&fields, "action_type")?,
            data: match field(&fields, "data") {
                None | Some(Value::Null) => Record::default(),
                Some(value) => Record {
                    id: string_field(&as_object(value.clone())?, "ID")?,
                },
            },
        })
    }
}

fn as_object(value: Value) -> Result<Map<String, Value>, serde_json::Error> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(serde::de::Error::custom(format!(
            "expected a JSON object, found `{other}`"
        ))),
    }
}

/// Look `name` up, falling back to a case-insensitive match.
fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).or_else(|| {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Result<String, serde_json::Error> {
    match field(fields, name) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid type for `{name}`: expected a string, found `{other}`"
        ))),
    }
}

/// Renders the record as compact JSON, e.g. `{"ID":"rec-42"}`.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
