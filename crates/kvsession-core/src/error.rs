use std::path::PathBuf;

/// Core error types for kvsession.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cookie error: {0}")]
    Cookie(#[from] CookieError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid Set-Cookie header: {0}")]
    Header(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("cookie value failed authentication")]
    Authentication,

    #[error("cookie value expired")]
    Expired,

    #[error("cookie value too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("no key pairs configured")]
    NoKeyPairs,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializationError {
    #[error("non-string key value, cannot serialize session values: {0}")]
    NonStringKey(String),

    #[error("type not registered: {0}")]
    UnregisteredType(String),

    #[error("failed to encode session values: {0}")]
    Encode(String),

    #[error("failed to decode session values: {0}")]
    Decode(String),

    #[error("expected object of type {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
