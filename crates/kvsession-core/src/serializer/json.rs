use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{Map, Number};

use crate::error::SerializationError;
use crate::session::value::{Key, Value, Values};

use super::SessionSerializer;

/// JSON encoding of the value-bag.
///
/// Keys must be strings. The conversion is lossy by contract: numbers come
/// back as [`Value::Float`], bytes as base64 [`Value::String`], and
/// application objects as a generic [`Value::Map`] of their fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonSerializer;

impl SessionSerializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn serialize(&self, values: &Values) -> Result<Vec<u8>, SerializationError> {
        let mut m = Map::with_capacity(values.len());
        for (k, v) in values {
            let Key::Str(ks) = k else {
                return Err(SerializationError::NonStringKey(k.to_string()));
            };
            m.insert(ks.clone(), to_json(v)?);
        }
        serde_json::to_vec(&m).map_err(|e| SerializationError::Encode(e.to_string()))
    }

    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), SerializationError> {
        let m: Map<String, serde_json::Value> =
            serde_json::from_slice(data).map_err(|e| SerializationError::Decode(e.to_string()))?;
        values.extend(m.into_iter().map(|(k, v)| (Key::Str(k), from_json(v))));
        Ok(())
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, SerializationError> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| SerializationError::Encode(format!("unsupported float value: {f}")))?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(BASE64.encode(b)),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<Result<_, _>>()?)
        }
        Value::Map(m) => serde_json::Value::Object(
            m.iter()
                .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
                .collect::<Result<_, SerializationError>>()?,
        ),
        Value::Object(obj) => rmp_serde::from_slice(&obj.payload)
            .map_err(|e| SerializationError::Encode(format!("{}: {}", obj.type_name, e)))?,
    })
}

fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Float(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(m) => {
            Value::Map(m.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}
