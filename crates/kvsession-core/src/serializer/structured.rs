use std::sync::Arc;

use crate::error::SerializationError;
use crate::session::value::{Key, SessionType, Value, Values};

use super::{SessionSerializer, TypeRegistry};

/// Byte-exact MessagePack encoding of the value-bag.
///
/// Every value, key and registered application type round-trips with its
/// exact variant. Objects whose type is not registered are rejected on both
/// serialize and deserialize.
#[derive(Clone)]
pub struct StructuredSerializer {
    registry: Arc<TypeRegistry>,
}

impl StructuredSerializer {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(TypeRegistry::new()))
    }

    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Register an application type with this serializer's registry.
    pub fn register<T: SessionType>(&self) -> &Self {
        self.registry.register::<T>();
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }
}

impl Default for StructuredSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSerializer for StructuredSerializer {
    fn name(&self) -> &str {
        "structured"
    }

    fn serialize(&self, values: &Values) -> Result<Vec<u8>, SerializationError> {
        let mut entries: Vec<(&Key, &Value)> = values.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        for (_, value) in &entries {
            value.visit_objects(&mut |obj| self.registry.check_registered(obj))?;
        }

        rmp_serde::to_vec(&entries).map_err(|e| SerializationError::Encode(e.to_string()))
    }

    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), SerializationError> {
        let entries: Vec<(Key, Value)> =
            rmp_serde::from_slice(data).map_err(|e| SerializationError::Decode(e.to_string()))?;

        for (_, value) in &entries {
            value.visit_objects(&mut |obj| self.registry.check_object(obj))?;
        }

        values.extend(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        name: String,
        roles: Vec<String>,
        balance: Option<i64>,
    }

    impl SessionType for Account {
        const TYPE_NAME: &'static str = "Account";
    }

    fn sample_values() -> Values {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::from("b"));
        map.insert("c".to_string(), Value::from("d"));

        let account = Account {
            name: "object".into(),
            roles: vec!["admin".into()],
            balance: Some(-5),
        };

        let mut values = Values::new();
        values.insert("string".into(), "value".into());
        values.insert("number".into(), Value::Int(54321));
        values.insert("float".into(), Value::Float(1.5));
        values.insert("bytes".into(), Value::Bytes(vec![0, 1, 255]));
        values.insert("object".into(), Value::object(&account).unwrap());
        values.insert(
            "array".into(),
            Value::List(vec!["a".into(), "b".into(), "c".into()]),
        );
        values.insert("map".into(), Value::Map(map));
        values.insert("nil".into(), Value::Null);
        values.insert(Key::Int(12345), Value::Bool(true));
        values
    }

    #[test]
    fn test_roundtrip_exact() {
        let serializer = StructuredSerializer::new();
        serializer.register::<Account>();

        let give = sample_values();
        let data = serializer.serialize(&give).unwrap();
        assert!(!data.is_empty());

        let mut got = Values::new();
        serializer.deserialize(&data, &mut got).unwrap();
        assert_eq!(got, give);

        let account = got[&Key::from("object")].to_object::<Account>().unwrap();
        assert_eq!(account.roles, vec!["admin".to_string()]);
        assert_eq!(got[&Key::from("number")].as_i64(), Some(54321));
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let serializer = StructuredSerializer::new();
        serializer.register::<Account>();
        let values = sample_values();
        assert_eq!(
            serializer.serialize(&values).unwrap(),
            serializer.serialize(&values.clone()).unwrap()
        );
    }

    #[test]
    fn test_deserialize_merges() {
        let serializer = StructuredSerializer::new();

        let mut stored = Values::new();
        stored.insert("a".into(), Value::Int(1));
        stored.insert("b".into(), Value::Int(2));
        let data = serializer.serialize(&stored).unwrap();

        let mut target = Values::new();
        target.insert("b".into(), Value::Int(0));
        target.insert("keep".into(), "me".into());
        serializer.deserialize(&data, &mut target).unwrap();

        assert_eq!(target.len(), 3);
        assert_eq!(target[&Key::from("a")], Value::Int(1));
        assert_eq!(target[&Key::from("b")], Value::Int(2));
        assert_eq!(target[&Key::from("keep")], Value::from("me"));
    }

    #[test]
    fn test_unregistered_type_rejected_on_serialize() {
        let serializer = StructuredSerializer::new();
        let mut values = Values::new();
        let account = Account {
            name: "x".into(),
            roles: vec![],
            balance: None,
        };
        values.insert(
            "nested".into(),
            Value::List(vec![Value::object(&account).unwrap()]),
        );

        assert_eq!(
            serializer.serialize(&values),
            Err(SerializationError::UnregisteredType("Account".into()))
        );
    }

    #[test]
    fn test_unregistered_type_rejected_on_deserialize() {
        let writer = StructuredSerializer::new();
        writer.register::<Account>();
        let data = writer.serialize(&sample_values()).unwrap();

        let reader = StructuredSerializer::new();
        let mut target = Values::new();
        target.insert("untouched".into(), Value::Null);
        assert_eq!(
            reader.deserialize(&data, &mut target),
            Err(SerializationError::UnregisteredType("Account".into()))
        );
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn test_malformed_bytes() {
        let serializer = StructuredSerializer::new();
        let mut target = Values::new();
        assert!(matches!(
            serializer.deserialize(b"not messagepack at all", &mut target),
            Err(SerializationError::Decode(_))
        ));
        assert!(target.is_empty());
    }

    #[test]
    fn test_shared_registry() {
        let registry = Arc::new(TypeRegistry::new());
        let a = StructuredSerializer::with_registry(Arc::clone(&registry));
        let b = StructuredSerializer::with_registry(Arc::clone(&registry));
        a.register::<Account>();
        assert!(b.registry().has("Account"));
    }
}
