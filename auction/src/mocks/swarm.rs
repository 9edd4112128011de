//! Mock topic overlay for testing.

use crate::crypto::Digest;
use crate::traits::{PeerId, TopicSwarm};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A recorded broadcast for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedBroadcast {
    pub topic: Digest,
    pub data: Vec<u8>,
    pub sequence_number: u64,
}

/// Mock overlay that records broadcasts instead of delivering them.
#[derive(Debug, Clone)]
pub struct MockSwarm {
    peer_id: PeerId,
    /// All broadcasts that have been sent.
    broadcasts: Arc<RwLock<Vec<RecordedBroadcast>>>,
    /// Topics currently joined at the overlay level.
    joined: Arc<RwLock<HashSet<Digest>>>,
    /// How many peers each broadcast claims to reach.
    reach: Arc<AtomicUsize>,
    /// Number of overlay-level join calls.
    join_calls: Arc<AtomicU64>,
    fail_broadcasts: Arc<RwLock<bool>>,
    fail_joins: Arc<RwLock<bool>>,
    message_counter: Arc<AtomicU64>,
}

impl MockSwarm {
    /// Create a new mock overlay for `peer_id`.
    pub fn new(peer_id: impl Into<PeerId>) -> Self {
        Self {
            peer_id: peer_id.into(),
            broadcasts: Arc::new(RwLock::new(Vec::new())),
            joined: Arc::new(RwLock::new(HashSet::new())),
            reach: Arc::new(AtomicUsize::new(1)),
            join_calls: Arc::new(AtomicU64::new(0)),
            fail_broadcasts: Arc::new(RwLock::new(false)),
            fail_joins: Arc::new(RwLock::new(false)),
            message_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set how many peers each successful broadcast reports reaching.
    pub fn set_reach(&self, peers: usize) {
        self.reach.store(peers, Ordering::SeqCst);
    }

    /// Set whether broadcasts should fail.
    pub async fn set_fail_broadcasts(&self, fail: bool) {
        *self.fail_broadcasts.write().await = fail;
    }

    /// Set whether joins should fail.
    pub async fn set_fail_joins(&self, fail: bool) {
        *self.fail_joins.write().await = fail;
    }

    /// Get all recorded broadcasts.
    pub async fn get_broadcasts(&self) -> Vec<RecordedBroadcast> {
        self.broadcasts.read().await.clone()
    }

    /// Decode every recorded broadcast as JSON (for test assertions).
    pub async fn broadcast_json(&self) -> Vec<serde_json::Value> {
        self.broadcasts
            .read()
            .await
            .iter()
            .filter_map(|b| serde_json::from_slice(&b.data).ok())
            .collect()
    }

    /// Clear all recorded broadcasts.
    pub async fn clear_broadcasts(&self) {
        self.broadcasts.write().await.clear();
    }

    /// Get the number of broadcasts sent.
    pub async fn broadcast_count(&self) -> usize {
        self.broadcasts.read().await.len()
    }

    /// Whether the overlay currently has `topic` joined.
    pub async fn is_joined(&self, topic: &Digest) -> bool {
        self.joined.read().await.contains(topic)
    }

    /// Number of join calls that reached the overlay.
    pub fn join_calls(&self) -> u64 {
        self.join_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicSwarm for MockSwarm {
    fn local_peer(&self) -> PeerId {
        self.peer_id.clone()
    }

    async fn join(&self, topic: &Digest) -> Result<()> {
        if *self.fail_joins.read().await {
            return Err(anyhow!("MockSwarm: simulated join failure"));
        }
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        self.joined.write().await.insert(*topic);
        Ok(())
    }

    async fn leave(&self, topic: &Digest) -> Result<()> {
        self.joined.write().await.remove(topic);
        Ok(())
    }

    async fn broadcast(&self, topic: &Digest, message: Vec<u8>) -> Result<usize> {
        if *self.fail_broadcasts.read().await {
            return Err(anyhow!("MockSwarm: simulated broadcast failure"));
        }

        let sequence_number = self.message_counter.fetch_add(1, Ordering::SeqCst);
        self.broadcasts.write().await.push(RecordedBroadcast {
            topic: *topic,
            data: message,
            sequence_number,
        });
        Ok(self.reach.load(Ordering::SeqCst))
    }
}
