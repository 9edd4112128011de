//! File-backed key-value store: an append-only JSON-lines log replayed into
//! an in-memory index on open.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::traits::KvStore;

/// One line of the log.
#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    key: String,
    /// Hex-encoded value bytes
    value: String,
}

#[derive(Debug)]
struct LogStoreInner {
    path: PathBuf,
    index: RwLock<HashMap<String, Vec<u8>>>,
    file: Mutex<File>,
}

/// Append-only log store. Later entries for a key shadow earlier ones.
#[derive(Debug, Clone)]
pub struct LogStore {
    inner: Arc<LogStoreInner>,
}

impl LogStore {
    /// Open (or create) the log at `path` and replay it.
    ///
    /// A trailing line that does not parse is treated as a torn write and
    /// skipped; any earlier unparsable line is an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let index = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => replay(&contents, &path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        info!("Opened store {} with {} keys", path.display(), index.len());
        Ok(Self {
            inner: Arc::new(LogStoreInner {
                path,
                index: RwLock::new(index),
                file: Mutex::new(file),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub async fn len(&self) -> usize {
        self.inner.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.index.read().await.is_empty()
    }
}

fn replay(contents: &str, path: &Path) -> Result<HashMap<String, Vec<u8>>> {
    let mut index = HashMap::new();
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    let last = lines.len().saturating_sub(1);

    for (n, line) in lines.iter().enumerate() {
        let parsed = serde_json::from_str::<LogEntry>(line)
            .map_err(anyhow::Error::from)
            .and_then(|entry| Ok((entry.key, hex::decode(entry.value)?)));
        match parsed {
            Ok((key, value)) => {
                index.insert(key, value);
            }
            Err(e) if n == last => {
                warn!(
                    "Skipping torn trailing entry in {}: {}",
                    path.display(),
                    e
                );
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Corrupt entry at line {} of {}", n + 1, path.display())
                });
            }
        }
    }
    Ok(index)
}

#[async_trait]
impl KvStore for LogStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.index.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let entry = LogEntry {
            key: key.to_string(),
            value: hex::encode(&value),
        };
        let mut line = serde_json::to_vec(&entry).context("Failed to encode log entry")?;
        line.push(b'\n');

        // The file lock is held until the index is updated so that index
        // order always matches log order.
        let mut file = self.inner.file.lock().await;
        file.write_all(&line)
            .await
            .with_context(|| format!("Failed to append to {}", self.inner.path.display()))?;
        file.flush().await?;
        file.sync_data().await?;

        self.inner.index.write().await.insert(key.to_string(), value);
        debug!("Stored {} ({} bytes)", key, line.len());
        Ok(())
    }
}
