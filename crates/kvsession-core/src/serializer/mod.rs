pub mod json;
pub mod structured;

pub use json::JsonSerializer;
pub use structured::StructuredSerializer;

use dashmap::DashMap;

use crate::error::SerializationError;
use crate::session::value::{Object, SessionType, Values};

/// Strategy converting a session value-bag to and from backend bytes.
pub trait SessionSerializer: Send + Sync {
    /// Serializer name, for logs.
    fn name(&self) -> &str;

    /// Encode the value-bag.
    fn serialize(&self, values: &Values) -> Result<Vec<u8>, SerializationError>;

    /// Decode `data` and merge the entries into `values`.
    ///
    /// On error `values` is left untouched.
    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), SerializationError>;
}

type PayloadCheck = fn(&[u8]) -> Result<(), String>;

fn check_payload<T: SessionType>(payload: &[u8]) -> Result<(), String> {
    rmp_serde::from_slice::<T>(payload)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Lock-free registry of application types allowed in session values.
pub struct TypeRegistry {
    types: DashMap<String, PayloadCheck>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: DashMap::new(),
        }
    }

    /// Register a type.
    pub fn register<T: SessionType>(&self) {
        self.types
            .insert(T::TYPE_NAME.to_string(), check_payload::<T> as PayloadCheck);
    }

    /// Check if a type name is registered.
    pub fn has(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Get list of registered type names.
    pub fn type_names(&self) -> Vec<String> {
        self.types.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Ensure an object's type is registered.
    pub(crate) fn check_registered(&self, obj: &Object) -> Result<(), SerializationError> {
        if self.has(&obj.type_name) {
            Ok(())
        } else {
            Err(SerializationError::UnregisteredType(obj.type_name.clone()))
        }
    }

    /// Ensure an object's type is registered and its payload decodes as that type.
    pub(crate) fn check_object(&self, obj: &Object) -> Result<(), SerializationError> {
        let check = self
            .types
            .get(&obj.type_name)
            .map(|entry| *entry.value())
            .ok_or_else(|| SerializationError::UnregisteredType(obj.type_name.clone()))?;
        check(&obj.payload)
            .map_err(|e| SerializationError::Decode(format!("{}: {}", obj.type_name, e)))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
