//! Session value-bag types.
//!
//! A session holds a heterogeneous map of [`Key`] to [`Value`]. Application
//! types are carried as [`Value::Object`]: a registered type name plus a
//! MessagePack payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::SerializationError;

/// The session value-bag.
pub type Values = HashMap<Key, Value>;

/// A value-bag key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Str(String),
    Int(i64),
}

impl Key {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            Key::Int(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{s}"),
            Key::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

/// An application-defined value stored in a session.
///
/// Types must be registered with the structured serializer's
/// [`TypeRegistry`](crate::serializer::TypeRegistry) before sessions holding
/// them can be saved or loaded.
pub trait SessionType: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable name written alongside the payload.
    const TYPE_NAME: &'static str;
}

/// A value of a registered application type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub type_name: String,
    pub payload: Vec<u8>,
}

/// A session value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(Object),
}

impl Value {
    /// Wrap an application value.
    pub fn object<T: SessionType>(value: &T) -> Result<Self, SerializationError> {
        let payload =
            rmp_serde::to_vec_named(value).map_err(|e| SerializationError::Encode(e.to_string()))?;
        Ok(Value::Object(Object {
            type_name: T::TYPE_NAME.to_string(),
            payload,
        }))
    }

    /// Unwrap an application value previously stored with [`Value::object`].
    pub fn to_object<T: SessionType>(&self) -> Result<T, SerializationError> {
        match self {
            Value::Object(obj) if obj.type_name == T::TYPE_NAME => rmp_serde::from_slice(&obj.payload)
                .map_err(|e| SerializationError::Decode(e.to_string())),
            other => Err(SerializationError::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    /// Short description of the variant, or the type name for objects.
    pub fn kind(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(obj) => &obj.type_name,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Visit every object nested in this value, depth first.
    pub(crate) fn visit_objects<'a, F>(&'a self, f: &mut F) -> Result<(), SerializationError>
    where
        F: FnMut(&'a Object) -> Result<(), SerializationError>,
    {
        match self {
            Value::Object(obj) => f(obj),
            Value::List(items) => items.iter().try_for_each(|v| v.visit_objects(f)),
            Value::Map(m) => m.values().try_for_each(|v| v.visit_objects(f)),
            _ => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
