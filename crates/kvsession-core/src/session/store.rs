//! Session store.
//!
//! Resolves a request's cookie into a [`Session`], loads and persists its
//! values through a [`Backend`], and writes the outgoing `Set-Cookie`.
//!
//! Resolution is fail-open by default: a missing, undecodable or expired
//! cookie, a backend read failure, or an undecodable record all yield a fresh
//! session. Save and delete failures are always returned to the caller.

use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use cookie::Cookie;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::codec::{CookieCodec, KeyPair, DEFAULT_MAX_LENGTH};
use crate::config::{StoreConfig, DEFAULT_KEY_PREFIX};
use crate::error::{Result, SessionError};
use crate::serializer::{SessionSerializer, StructuredSerializer, TypeRegistry};
use crate::util::generate_session_id;

use super::{Session, SessionOptions};

/// Produces identifiers for sessions saved without one.
pub type KeyGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Server-side session store.
///
/// Holds only immutable configuration; share it across request handlers
/// behind an `Arc`.
pub struct Store {
    backend: Arc<dyn Backend>,
    codec: CookieCodec,
    serializer: Arc<dyn SessionSerializer>,
    key_gen: KeyGenerator,
    key_prefix: String,
    options: SessionOptions,
    fail_closed: bool,
}

impl Store {
    pub fn builder(backend: Arc<dyn Backend>, key_pairs: Vec<KeyPair>) -> StoreBuilder {
        StoreBuilder::new(backend, key_pairs)
    }

    /// Build a store with default prefix, serializer, key generator and options.
    pub fn new(backend: Arc<dyn Backend>, key_pairs: Vec<KeyPair>) -> Result<Self> {
        Self::builder(backend, key_pairs).build()
    }

    /// Build from config with an empty type registry.
    ///
    /// Stores whose sessions hold application objects should use
    /// [`Store::from_config_with_registry`].
    pub fn from_config(backend: Arc<dyn Backend>, config: &StoreConfig) -> Result<Self> {
        Self::from_config_with_registry(backend, config, Arc::new(TypeRegistry::new()))
    }

    /// Build from config, resolving application object types through `registry`.
    pub fn from_config_with_registry(
        backend: Arc<dyn Backend>,
        config: &StoreConfig,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self> {
        Self::builder(backend, config.key_pairs()?)
            .key_prefix(config.key_prefix.clone())
            .serializer(config.serializer.build_with_registry(registry))
            .session_options(config.session_options.clone())
            .max_cookie_length(config.max_cookie_length)
            .fail_closed(config.fail_closed)
            .build()
    }

    /// Default options copied into every new session.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Set the default max-age for new sessions and the cookie expiry bound.
    ///
    /// Individual sessions are deleted by setting their own
    /// `options.max_age` to a value <= 0 before saving.
    pub fn set_max_age(&mut self, max_age: i64) {
        self.options.max_age = max_age;
        self.codec.set_max_age(max_age);
    }

    /// Start a per-request registry over the request's headers.
    pub fn registry<'a>(&'a self, request: &'a HeaderMap) -> Registry<'a> {
        Registry {
            store: self,
            request,
            sessions: HashMap::new(),
        }
    }

    fn backend_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Resolve the session named `name` for a request.
    ///
    /// Never fails unless the store was built with `fail_closed(true)`.
    pub async fn new_session(&self, request: &HeaderMap, name: &str) -> Result<Session> {
        let mut session = Session::new(name, self.options.clone());

        let Some(value) = read_cookie(request, name) else {
            return Ok(session);
        };

        match self.codec.decode(name, &value) {
            Ok(id) => session.id = id,
            Err(e) => {
                debug!("Ignoring session cookie '{}': {}", name, e);
                if self.fail_closed {
                    return Err(e.into());
                }
                return Ok(session);
            }
        }

        if session.id.is_empty() {
            return Ok(session);
        }

        match self.load(&mut session).await {
            Ok(()) => {}
            Err(SessionError::Backend(e)) if e.is_not_found() => {
                debug!("No stored data for session cookie '{}'", name);
            }
            Err(e) => {
                warn!("Failed to load session '{}': {}", name, e);
                if self.fail_closed {
                    return Err(e);
                }
            }
        }

        Ok(session)
    }

    /// Persist the session and append its `Set-Cookie` to `response`.
    ///
    /// A session whose `options.max_age` is <= 0 is deleted instead: its
    /// backend record is removed and an empty cookie with a negative
    /// `Max-Age` is written.
    pub async fn save(&self, response: &mut HeaderMap, session: &mut Session) -> Result<()> {
        if session.options.max_age <= 0 {
            self.remove_record(session).await?;
            let clearing = SessionOptions {
                max_age: session.options.max_age.min(-1),
                ..session.options.clone()
            };
            let header = set_cookie_header(session.name(), "", &clearing)?;
            response.append(SET_COOKIE, header);
            return Ok(());
        }

        if session.id.is_empty() {
            session.id = (self.key_gen)();
        }

        // Backend first: a failure after this point orphans a record that
        // TTL reclaims, never a cookie pointing at nothing.
        self.persist(session).await?;

        let encoded = self.codec.encode(session.name(), &session.id)?;
        let header = set_cookie_header(session.name(), &encoded, &session.options)?;
        response.append(SET_COOKIE, header);
        Ok(())
    }

    /// Merge the backend record for `session.id` into the session's values.
    ///
    /// Unlike [`Store::new_session`], errors are returned as-is, including
    /// [`BackendError::NotFound`](crate::error::BackendError::NotFound).
    pub async fn load(&self, session: &mut Session) -> Result<()> {
        let data = self.backend.get(&self.backend_key(&session.id)).await?;
        self.serializer.deserialize(&data, &mut session.values)?;
        session.mark_loaded();
        Ok(())
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        let data = self.serializer.serialize(&session.values)?;
        let ttl = Duration::from_secs(session.options.max_age.unsigned_abs());
        self.backend
            .set(&self.backend_key(&session.id), &data, ttl)
            .await?;
        Ok(())
    }

    /// Invalidate the session and save it, removing its backend record and
    /// writing a clearing cookie.
    pub async fn delete(&self, response: &mut HeaderMap, session: &mut Session) -> Result<()> {
        session.invalidate();
        self.save(response, session).await
    }

    async fn remove_record(&self, session: &Session) -> Result<()> {
        if session.id.is_empty() {
            return Ok(());
        }
        match self.backend.del(&self.backend_key(&session.id)).await {
            Ok(()) => debug!("Deleted session record for cookie '{}'", session.name()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("key_prefix", &self.key_prefix)
            .field("serializer", &self.serializer.name())
            .field("codec", &self.codec)
            .field("options", &self.options)
            .field("fail_closed", &self.fail_closed)
            .finish()
    }
}

/// Builder for [`Store`].
pub struct StoreBuilder {
    backend: Arc<dyn Backend>,
    key_pairs: Vec<KeyPair>,
    key_prefix: String,
    serializer: Arc<dyn SessionSerializer>,
    key_gen: KeyGenerator,
    options: SessionOptions,
    max_cookie_length: usize,
    fail_closed: bool,
}

impl StoreBuilder {
    pub fn new(backend: Arc<dyn Backend>, key_pairs: Vec<KeyPair>) -> Self {
        Self {
            backend,
            key_pairs,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            serializer: Arc::new(StructuredSerializer::new()),
            key_gen: Arc::new(generate_session_id),
            options: SessionOptions::default(),
            max_cookie_length: DEFAULT_MAX_LENGTH,
            fail_closed: false,
        }
    }

    /// Prefix prepended to session ids to form backend keys.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Serializer for backend records. Defaults to [`StructuredSerializer`].
    pub fn serializer(mut self, serializer: Arc<dyn SessionSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn key_generator<F>(mut self, key_gen: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.key_gen = Arc::new(key_gen);
        self
    }

    pub fn session_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_cookie_length(mut self, max_length: usize) -> Self {
        self.max_cookie_length = max_length;
        self
    }

    /// Surface cookie and load errors from resolution instead of returning a
    /// fresh session.
    pub fn fail_closed(mut self, fail_closed: bool) -> Self {
        self.fail_closed = fail_closed;
        self
    }

    pub fn build(self) -> Result<Store> {
        let codec = CookieCodec::new(&self.key_pairs)?.with_max_length(self.max_cookie_length);
        let max_age = self.options.max_age;
        let mut store = Store {
            backend: self.backend,
            codec,
            serializer: self.serializer,
            key_gen: self.key_gen,
            key_prefix: self.key_prefix,
            options: self.options,
            fail_closed: self.fail_closed,
        };
        store.set_max_age(max_age);
        Ok(store)
    }
}

/// Per-request session cache.
///
/// [`Registry::get`] resolves each cookie name at most once per request;
/// [`Registry::save`] saves every session handed out.
pub struct Registry<'a> {
    store: &'a Store,
    request: &'a HeaderMap,
    sessions: HashMap<String, Session>,
}

impl<'a> Registry<'a> {
    pub async fn get(&mut self, name: &str) -> Result<&mut Session> {
        match self.sessions.entry(name.to_string()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let session = self.store.new_session(self.request, name).await?;
                Ok(e.insert(session))
            }
        }
    }

    /// Save every resolved session. All saves are attempted; the first error
    /// is returned.
    pub async fn save(&mut self, response: &mut HeaderMap) -> Result<()> {
        let mut first_err = None;
        for session in self.sessions.values_mut() {
            if let Err(e) = self.store.save(response, session).await {
                warn!("Failed to save session '{}': {}", session.name(), e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Read the first cookie named `name` from the request's `Cookie` headers.
fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| Cookie::split_parse(s))
        .filter_map(|c| c.ok())
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

fn build_cookie(name: &str, value: &str, options: &SessionOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .secure(options.secure)
        .http_only(options.http_only)
        .max_age(CookieDuration::seconds(options.max_age));

    let expires = if options.max_age > 0 {
        OffsetDateTime::now_utc().checked_add(CookieDuration::seconds(options.max_age))
    } else {
        Some(OffsetDateTime::UNIX_EPOCH + CookieDuration::seconds(1))
    };
    if let Some(expires) = expires {
        builder = builder.expires(expires);
    }
    if !options.path.is_empty() {
        builder = builder.path(options.path.clone());
    }
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(same_site.into());
    }
    builder.build()
}

fn set_cookie_header(name: &str, value: &str, options: &SessionOptions) -> Result<HeaderValue> {
    let cookie = build_cookie(name, value, options);
    HeaderValue::from_str(&cookie.to_string()).map_err(|e| SessionError::Header(e.to_string()))
}
