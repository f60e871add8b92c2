pub mod memory;

pub use memory::MemoryBackend;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::BackendError;

/// Key-value backend holding serialized session records.
///
/// Any store with get / set-with-TTL / delete semantics fits: a networked
/// cache client, a database table, or [`MemoryBackend`]. Implementations own
/// their pooling, pipelining and retry policy. Dropping a returned future
/// cancels the call.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the bytes stored at `key`, or [`BackendError::NotFound`].
    async fn get(&self, key: &str) -> Result<Vec<u8>, BackendError>;

    /// Store `value` at `key`, expiring after `ttl`. A zero TTL means no expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError>;

    /// Remove `key`. Removing an absent key may succeed or return
    /// [`BackendError::NotFound`].
    async fn del(&self, key: &str) -> Result<(), BackendError>;
}
