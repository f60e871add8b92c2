pub mod store;
pub mod value;

pub use store::{KeyGenerator, Registry, Store, StoreBuilder};
pub use value::{Key, Object, SessionType, Value, Values};

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_AGE;
use crate::error::SerializationError;

/// Default cookie path.
pub const DEFAULT_PATH: &str = "/";

/// SameSite cookie policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(s: SameSite) -> Self {
        match s {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// Per-session cookie attributes and lifetime.
///
/// `max_age` is in seconds. A value <= 0 makes the next save delete the
/// session instead of persisting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            domain: None,
            max_age: DEFAULT_MAX_AGE,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }
}

/// A server-side session bound to one named cookie.
#[derive(Debug, Clone)]
pub struct Session {
    /// Backend key suffix. Empty until the first save assigns one.
    pub id: String,
    pub values: Values,
    pub options: SessionOptions,
    is_new: bool,
    name: String,
}

impl Session {
    pub fn new(name: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            id: String::new(),
            values: Values::new(),
            options,
            is_new: true,
            name: name.into(),
        }
    }

    /// Cookie name this session is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True unless the session's values were loaded from the backend.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.is_new = false;
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<&Value> {
        self.values.get(&key.into())
    }

    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: impl Into<Key>) -> Option<Value> {
        self.values.remove(&key.into())
    }

    /// Store an application value under `key`.
    pub fn insert_object<T: SessionType>(
        &mut self,
        key: impl Into<Key>,
        value: &T,
    ) -> Result<(), SerializationError> {
        self.values.insert(key.into(), Value::object(value)?);
        Ok(())
    }

    /// Read an application value stored under `key`.
    pub fn get_object<T: SessionType>(
        &self,
        key: impl Into<Key>,
    ) -> Result<Option<T>, SerializationError> {
        self.get(key).map(Value::to_object::<T>).transpose()
    }

    /// Mark the session for deletion on the next save.
    pub fn invalidate(&mut self) {
        self.options.max_age = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Visit {
        count: u32,
    }

    impl SessionType for Visit {
        const TYPE_NAME: &'static str = "Visit";
    }

    #[test]
    fn test_session_new() {
        let session = Session::new("sid", SessionOptions::default());
        assert_eq!(session.name(), "sid");
        assert!(session.is_new());
        assert!(session.id.is_empty());
        assert!(session.values.is_empty());
    }

    #[test]
    fn test_session_values() {
        let mut session = Session::new("sid", SessionOptions::default());
        session.insert("k", "v");
        session.insert(7, 1.5);
        assert_eq!(session.get("k"), Some(&Value::from("v")));
        assert_eq!(session.get(7), Some(&Value::Float(1.5)));
        assert_eq!(session.remove("k"), Some(Value::from("v")));
        assert!(session.get("k").is_none());
    }

    #[test]
    fn test_session_objects() {
        let mut session = Session::new("sid", SessionOptions::default());
        session.insert_object("visit", &Visit { count: 3 }).unwrap();
        assert_eq!(
            session.get_object::<Visit>("visit").unwrap(),
            Some(Visit { count: 3 })
        );
        assert_eq!(session.get_object::<Visit>("missing").unwrap(), None);

        session.insert("plain", "text");
        assert!(session.get_object::<Visit>("plain").is_err());
    }

    #[test]
    fn test_invalidate() {
        let mut session = Session::new("sid", SessionOptions::default());
        session.invalidate();
        assert!(session.options.max_age < 0);
    }

    #[test]
    fn test_default_options() {
        let options = SessionOptions::default();
        assert_eq!(options.path, "/");
        assert_eq!(options.max_age, 86400 * 30);
        assert!(options.domain.is_none());
    }

    #[test]
    fn test_options_serde_camel_case() {
        let options: SessionOptions = serde_json::from_str(
            r#"{"path": "/app", "maxAge": 60, "httpOnly": true, "sameSite": "strict"}"#,
        )
        .unwrap();
        assert_eq!(options.path, "/app");
        assert_eq!(options.max_age, 60);
        assert!(options.http_only);
        assert!(!options.secure);
        assert_eq!(options.same_site, Some(SameSite::Strict));
    }
}
