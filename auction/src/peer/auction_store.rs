//! Typed auction persistence over a raw [`KvStore`].
//!
//! Two kinds of entries live in the store:
//! - records keyed by the hex record id (JSON [`Auction`]),
//! - pointers keyed by the hex topic id whose value is the hex record id.

use tracing::{debug, warn};

use crate::config::{MAX_RECORD_SIZE, RESERVED_KEYS};
use crate::crypto::Digest;
use crate::error::{AuctionError, AuctionResult};
use crate::marketplace::Auction;
use crate::traits::KvStore;

/// Auction records and topic pointers on top of a key-value store.
#[derive(Debug, Clone)]
pub struct AuctionStore<K: KvStore> {
    kv: K,
}

impl<K: KvStore> AuctionStore<K> {
    pub const fn new(kv: K) -> Self {
        Self { kv }
    }

    /// The underlying key-value store.
    pub const fn kv(&self) -> &K {
        &self.kv
    }

    async fn get_raw(&self, key: &str) -> AuctionResult<Option<Vec<u8>>> {
        self.kv
            .get(key)
            .await
            .map_err(|e| AuctionError::Store(format!("get {key}: {e}")))
    }

    async fn put_raw(&self, key: &str, value: Vec<u8>) -> AuctionResult<()> {
        self.kv
            .put(key, value)
            .await
            .map_err(|e| AuctionError::Store(format!("put {key}: {e}")))
    }

    /// Fetch the record stored under `id`.
    pub async fn get_record(&self, id: &Digest) -> AuctionResult<Option<Auction>> {
        match self.get_raw(&id.to_hex()).await? {
            Some(data) => {
                let auction = Auction::from_bytes(&data).map_err(|e| {
                    AuctionError::Store(format!("corrupt record {id}: {e}"))
                })?;
                Ok(Some(auction))
            }
            None => Ok(None),
        }
    }

    /// Write a record under its own id.
    pub async fn put_record(&self, auction: &Auction) -> AuctionResult<()> {
        let data = auction.to_bytes()?;
        if data.len() > MAX_RECORD_SIZE {
            return Err(AuctionError::InvalidArgument(format!(
                "record for '{}' is {} bytes (max {MAX_RECORD_SIZE})",
                auction.title,
                data.len()
            )));
        }
        self.put_raw(&auction.id.to_hex(), data).await?;
        debug!("Stored record {} for '{}'", auction.id, auction.title);
        Ok(())
    }

    /// Resolve the current record id for a topic.
    pub async fn get_pointer(&self, topic: &Digest) -> AuctionResult<Option<Digest>> {
        match self.get_raw(&topic.to_hex()).await? {
            Some(data) => {
                let hex = std::str::from_utf8(&data).map_err(|e| {
                    AuctionError::Store(format!("corrupt pointer {topic}: {e}"))
                })?;
                let id = Digest::from_hex(hex).map_err(|e| {
                    AuctionError::Store(format!("corrupt pointer {topic}: {e}"))
                })?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Point `topic` at record `id`.
    pub async fn put_pointer(&self, topic: &Digest, id: &Digest) -> AuctionResult<()> {
        self.put_raw(&topic.to_hex(), id.to_hex().into_bytes())
            .await
    }

    /// Two-level lookup: topic → record id → record.
    ///
    /// A pointer whose record is missing resolves to `None`.
    pub async fn resolve(&self, topic: &Digest) -> AuctionResult<Option<Auction>> {
        let Some(id) = self.get_pointer(topic).await? else {
            return Ok(None);
        };
        let record = self.get_record(&id).await?;
        if record.is_none() {
            warn!("Pointer for topic {} references missing record {}", topic, id);
        }
        Ok(record)
    }

    /// Read a locally generated secret stored under a reserved key.
    pub async fn get_secret(&self, name: &str) -> AuctionResult<Option<Vec<u8>>> {
        ensure_reserved(name)?;
        self.get_raw(name).await
    }

    /// Store a locally generated secret under a reserved key.
    pub async fn put_secret(&self, name: &str, value: Vec<u8>) -> AuctionResult<()> {
        ensure_reserved(name)?;
        self.put_raw(name, value).await
    }
}

fn ensure_reserved(name: &str) -> AuctionResult<()> {
    if RESERVED_KEYS.contains(&name) {
        Ok(())
    } else {
        Err(AuctionError::InvalidArgument(format!(
            "'{name}' is not a reserved secret key"
        )))
    }
}
