//! Key-value storage abstraction for testable persistence.

use anyhow::Result;
use async_trait::async_trait;

/// Abstraction over a durable, ordered key-value store.
///
/// Only per-key atomicity is assumed: callers must not rely on two `put`
/// calls landing together.
#[async_trait]
pub trait KvStore: Send + Sync + Clone + 'static {
    /// Get the value stored under `key`.
    ///
    /// Returns `None` if the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
}
