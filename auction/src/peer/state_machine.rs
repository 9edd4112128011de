//! Auction transition logic: creation, bid acceptance, settlement.
//!
//! Every read-modify-write runs under a per-topic lock so two bids on the
//! same auction cannot interleave between the compare and the write.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::auction_store::AuctionStore;
use crate::crypto::{topic_id, Digest};
use crate::error::{AuctionError, AuctionResult};
use crate::marketplace::auction::{validate_bidder, validate_record, validate_title};
use crate::marketplace::Auction;
use crate::traits::KvStore;

/// Per-topic single-writer locks. An entry lives only while some caller
/// holds or waits on it, so the map stays bounded by in-flight writes.
#[derive(Debug, Clone, Default)]
pub struct AuctionLocks {
    locks: Arc<parking_lot::Mutex<HashMap<Digest, Arc<Mutex<()>>>>>,
}

impl AuctionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for `topic`, waiting behind any current holder.
    pub async fn acquire(&self, topic: &Digest) -> TopicGuard {
        let lock = {
            let mut locks = self.locks.lock();
            locks.entry(*topic).or_default().clone()
        };
        TopicGuard {
            guard: Some(lock.lock_owned().await),
            topic: *topic,
            locks: self.locks.clone(),
        }
    }

    /// Number of topics with a live entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held write lock for one topic. Dropping it releases the lock and prunes
/// the entry when nobody else is holding or waiting on it.
#[derive(Debug)]
pub struct TopicGuard {
    guard: Option<OwnedMutexGuard<()>>,
    topic: Digest,
    locks: Arc<parking_lot::Mutex<HashMap<Digest, Arc<Mutex<()>>>>>,
}

impl Drop for TopicGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are only taken under the map lock, so a count of one here
        // means the map holds the last reference.
        let mut locks = self.locks.lock();
        if locks
            .get(&self.topic)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.topic);
        }
    }
}

/// A committed local state change that other subscribers should learn about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A bid was accepted and persisted.
    BidAccepted {
        topic: Digest,
        amount: u64,
        bidder: String,
    },
    /// The auction moved to SETTLED with this final outcome.
    Settled {
        topic: Digest,
        amount: u64,
        bidder: Option<String>,
    },
    /// Nothing changed (e.g. settling an already settled auction).
    Unchanged,
}

/// Result of applying a transition received from another peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state changed.
    Applied,
    /// The message carried nothing newer than local state.
    Stale,
    /// The auction is already settled locally.
    Closed,
    /// No auction is known locally for the topic.
    UnknownTopic,
}

/// Transition logic for auctions held in one peer's store.
#[derive(Debug, Clone)]
pub struct AuctionStateMachine<K: KvStore> {
    store: AuctionStore<K>,
    locks: AuctionLocks,
}

impl<K: KvStore> AuctionStateMachine<K> {
    pub fn new(store: AuctionStore<K>) -> Self {
        Self {
            store,
            locks: AuctionLocks::new(),
        }
    }

    pub const fn store(&self) -> &AuctionStore<K> {
        &self.store
    }

    pub const fn locks(&self) -> &AuctionLocks {
        &self.locks
    }

    /// Create an OPEN auction and index it by topic.
    ///
    /// The record is written before the pointer, so a failed pointer write
    /// leaves an unreachable record rather than a pointer to nothing.
    pub async fn create(&self, title: &str, amount: u64) -> AuctionResult<Auction> {
        let auction = Auction::open(title, amount)?;
        let topic = auction.topic();
        let _guard = self.locks.acquire(&topic).await;

        if self.store.get_pointer(&topic).await?.is_some() {
            return Err(AuctionError::AlreadyExists(title.to_string()));
        }

        self.store.put_record(&auction).await?;
        self.store.put_pointer(&topic, &auction.id).await?;

        info!(
            "Created auction '{}' (starting amount {}) with id {} on topic {}",
            auction.title, auction.amount, auction.id, topic
        );
        Ok(auction)
    }

    /// Current local record for `title`, if any.
    pub async fn get(&self, title: &str) -> AuctionResult<Option<Auction>> {
        validate_title(title)?;
        self.store.resolve(&topic_id(title)).await
    }

    /// Current local record for a topic, if any.
    pub async fn get_by_topic(&self, topic: &Digest) -> AuctionResult<Option<Auction>> {
        self.store.resolve(topic).await
    }

    /// Place a local bid.
    ///
    /// Rejected unless the auction is OPEN and `amount` strictly exceeds the
    /// current highest bid.
    pub async fn bid(&self, title: &str, amount: u64, bidder: &str) -> AuctionResult<Transition> {
        validate_title(title)?;
        validate_bid(amount, bidder)?;

        let topic = topic_id(title);
        let _guard = self.locks.acquire(&topic).await;

        let mut auction = self
            .store
            .resolve(&topic)
            .await?
            .ok_or_else(|| AuctionError::NotFound(title.to_string()))?;

        auction.accept_bid(amount, bidder)?;
        self.store.put_record(&auction).await?;

        info!(
            "Accepted bid of {} from {} on '{}'",
            amount, bidder, auction.title
        );
        Ok(Transition::BidAccepted {
            topic,
            amount,
            bidder: bidder.to_string(),
        })
    }

    /// Settle an auction locally. Settling twice is a successful no-op.
    pub async fn settle(&self, title: &str) -> AuctionResult<Transition> {
        validate_title(title)?;

        let topic = topic_id(title);
        let _guard = self.locks.acquire(&topic).await;

        let mut auction = self
            .store
            .resolve(&topic)
            .await?
            .ok_or_else(|| AuctionError::NotFound(title.to_string()))?;

        if !auction.settle() {
            debug!("Auction '{}' already settled", auction.title);
            return Ok(Transition::Unchanged);
        }
        self.store.put_record(&auction).await?;

        info!(
            "Settled auction '{}' at {} (winner: {})",
            auction.title,
            auction.highest_bid,
            auction.highest_bidder.as_deref().unwrap_or("none")
        );
        Ok(Transition::Settled {
            topic,
            amount: auction.highest_bid,
            bidder: auction.highest_bidder,
        })
    }

    /// Apply a bid broadcast by another peer.
    pub async fn apply_remote_bid(
        &self,
        topic: &Digest,
        amount: u64,
        bidder: &str,
    ) -> AuctionResult<ApplyOutcome> {
        let _guard = self.locks.acquire(topic).await;

        let Some(mut auction) = self.store.resolve(topic).await? else {
            return Ok(ApplyOutcome::UnknownTopic);
        };

        match auction.accept_bid(amount, bidder) {
            Ok(()) => {}
            Err(AuctionError::AuctionSettled(_)) => return Ok(ApplyOutcome::Closed),
            Err(AuctionError::BidTooLow { .. }) => return Ok(ApplyOutcome::Stale),
            Err(e) => return Err(e),
        }
        self.store.put_record(&auction).await?;

        debug!(
            "Applied remote bid of {} from {} on '{}'",
            amount, bidder, auction.title
        );
        Ok(ApplyOutcome::Applied)
    }

    /// Apply a settlement broadcast by another peer.
    ///
    /// The settling peer's final bid and bidder become the local outcome.
    pub async fn apply_remote_settle(
        &self,
        topic: &Digest,
        amount: u64,
        bidder: Option<&str>,
    ) -> AuctionResult<ApplyOutcome> {
        let _guard = self.locks.acquire(topic).await;

        let Some(mut auction) = self.store.resolve(topic).await? else {
            return Ok(ApplyOutcome::UnknownTopic);
        };
        if !auction.settle() {
            return Ok(ApplyOutcome::Closed);
        }

        if auction.highest_bid != amount || auction.highest_bidder.as_deref() != bidder {
            debug!(
                "Adopting settled outcome {} / {:?} for '{}' (local was {} / {:?})",
                amount, bidder, auction.title, auction.highest_bid, auction.highest_bidder
            );
        }
        auction.highest_bid = amount;
        auction.highest_bidder = bidder.map(ToString::to_string);
        self.store.put_record(&auction).await?;

        info!("Applied remote settlement of '{}'", auction.title);
        Ok(ApplyOutcome::Applied)
    }

    /// Merge a full record received from another peer.
    ///
    /// Records whose id does not match their creation snapshot are refused.
    pub async fn apply_snapshot(&self, incoming: Auction) -> AuctionResult<ApplyOutcome> {
        validate_record(&incoming)?;
        if !incoming.has_valid_id() {
            return Err(AuctionError::InvalidArgument(format!(
                "snapshot id {} does not match content of '{}'",
                incoming.id, incoming.title
            )));
        }

        let topic = incoming.topic();
        let _guard = self.locks.acquire(&topic).await;

        match self.store.resolve(&topic).await? {
            None => {
                self.store.put_record(&incoming).await?;
                self.store.put_pointer(&topic, &incoming.id).await?;
                info!("Adopted snapshot of '{}' from peer", incoming.title);
                Ok(ApplyOutcome::Applied)
            }
            Some(local) if local.id != incoming.id => {
                warn!(
                    "Ignoring snapshot of '{}' with id {}: local record is {}",
                    incoming.title, incoming.id, local.id
                );
                Ok(ApplyOutcome::Stale)
            }
            Some(local) if local.is_superseded_by(&incoming) => {
                self.store.put_record(&incoming).await?;
                debug!("Snapshot advanced '{}'", incoming.title);
                Ok(ApplyOutcome::Applied)
            }
            Some(local) if local.is_settled() => Ok(ApplyOutcome::Closed),
            Some(_) => Ok(ApplyOutcome::Stale),
        }
    }
}

fn validate_bid(amount: u64, bidder: &str) -> AuctionResult<()> {
    if amount == 0 {
        return Err(AuctionError::InvalidArgument("amount is required".into()));
    }
    validate_bidder(bidder)
}
