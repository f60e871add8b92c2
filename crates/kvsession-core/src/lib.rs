//! Server-side HTTP sessions.
//!
//! Session values live in a key-value [`Backend`]; the client only holds an
//! authenticated (optionally encrypted) cookie carrying the session id.

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod serializer;
pub mod session;
pub mod util;

pub use backend::{Backend, MemoryBackend};
pub use codec::{CookieCodec, KeyPair};
pub use config::{load_config, load_config_from_env, StoreConfig};
pub use error::{BackendError, CookieError, Result, SerializationError, SessionError};
pub use serializer::{JsonSerializer, SessionSerializer, StructuredSerializer, TypeRegistry};
pub use session::{
    Key, Registry, SameSite, Session, SessionOptions, SessionType, Store, StoreBuilder, Value,
    Values,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
