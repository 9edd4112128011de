//! Mock key-value store for testing.

use crate::traits::KvStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Types of failures that can be simulated.
#[derive(Debug, Clone)]
pub enum MockStoreFailure {
    /// Fail all operations.
    All,
    /// Fail only read operations.
    Reads,
    /// Fail only write operations.
    Writes,
    /// Fail writes to one specific key.
    OnKey(String),
}

#[derive(Debug, Default)]
struct MockStoreInner {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fail_mode: RwLock<Option<MockStoreFailure>>,
    put_count: AtomicU64,
}

/// In-memory store with failure injection.
///
/// Clones share the same underlying map, so a test can keep a handle for
/// assertions while the peer under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    inner: Arc<MockStoreInner>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure mode for testing error handling.
    pub async fn set_fail_mode(&self, mode: Option<MockStoreFailure>) {
        *self.inner.fail_mode.write().await = mode;
    }

    async fn should_fail(&self, is_write: bool, key: &str) -> bool {
        let mode = self.inner.fail_mode.read().await;
        match &*mode {
            None => false,
            Some(MockStoreFailure::All) => true,
            Some(MockStoreFailure::Reads) => !is_write,
            Some(MockStoreFailure::Writes) => is_write,
            Some(MockStoreFailure::OnKey(k)) => is_write && k == key,
        }
    }

    /// Get a snapshot of all stored data (for test assertions).
    pub async fn snapshot(&self) -> HashMap<String, Vec<u8>> {
        self.inner.entries.read().await.clone()
    }

    /// Check if a key has been written.
    pub async fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.read().await.contains_key(key)
    }

    /// Number of keys stored.
    pub async fn key_count(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> u64 {
        self.inner.put_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for MockStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.should_fail(false, key).await {
            return Err(anyhow!("MockStore: simulated read failure"));
        }
        Ok(self.inner.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.should_fail(true, key).await {
            return Err(anyhow!("MockStore: simulated write failure on {key}"));
        }
        self.inner
            .entries
            .write()
            .await
            .insert(key.to_string(), value);
        self.inner.put_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
