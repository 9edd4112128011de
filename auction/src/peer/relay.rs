//! Topic gossip: outbound publication of committed transitions and
//! inbound decoding/application of messages from other subscribers.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::gossip::{Decoded, DropReason, GossipMessage};
use super::state_machine::{ApplyOutcome, AuctionStateMachine, Transition};
use crate::crypto::Digest;
use crate::error::{AuctionError, AuctionResult};
use crate::marketplace::Auction;
use crate::traits::{InboundMessage, KvStore, TopicSwarm};
use crate::util::short_id;

/// Topics this peer has joined.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    topics: Arc<RwLock<HashSet<Digest>>>,
}

impl Subscriptions {
    pub fn contains(&self, topic: &Digest) -> bool {
        self.topics.read().contains(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.read().is_empty()
    }

    pub fn topics(&self) -> Vec<Digest> {
        self.topics.read().iter().copied().collect()
    }

    fn insert(&self, topic: Digest) -> bool {
        self.topics.write().insert(topic)
    }

    fn remove(&self, topic: &Digest) -> bool {
        self.topics.write().remove(topic)
    }
}

/// Relay counters.
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    applied: AtomicU64,
    stale: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    sent: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatsSnapshot {
    pub received: u64,
    pub applied: u64,
    pub stale: u64,
    pub dropped: u64,
    pub failed: u64,
    pub sent: u64,
}

impl RelayStats {
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Applied to the state machine with this outcome
    Handled(ApplyOutcome),
    /// A sync request answered with a snapshot
    Answered,
    /// A sync request for which this peer holds no record
    NothingToShare,
    /// Discarded before reaching the state machine
    Dropped(DropReason),
    /// The local store failed while applying
    Failed,
}

/// Gossip relay for one peer.
#[derive(Debug, Clone)]
pub struct GossipRelay<S: TopicSwarm> {
    swarm: S,
    subscriptions: Subscriptions,
    stats: Arc<RelayStats>,
}

impl<S: TopicSwarm> GossipRelay<S> {
    pub fn new(swarm: S) -> Self {
        Self {
            swarm,
            subscriptions: Subscriptions::default(),
            stats: Arc::new(RelayStats::default()),
        }
    }

    pub const fn swarm(&self) -> &S {
        &self.swarm
    }

    pub const fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_joined(&self, topic: &Digest) -> bool {
        self.subscriptions.contains(topic)
    }

    /// Subscribe to `topic`. Returns `false` if it was already joined.
    pub async fn join(&self, topic: &Digest) -> AuctionResult<bool> {
        if self.subscriptions.contains(topic) {
            debug!("Topic {} already joined", topic);
            return Ok(false);
        }

        self.swarm
            .join(topic)
            .await
            .map_err(|e| AuctionError::Swarm(format!("Failed to join topic {topic}: {e}")))?;
        self.subscriptions.insert(*topic);
        info!("Joined topic {}", topic);
        Ok(true)
    }

    /// Unsubscribe from `topic`. Returns `false` if it was not joined.
    pub async fn leave(&self, topic: &Digest) -> AuctionResult<bool> {
        if !self.subscriptions.contains(topic) {
            debug!("Topic {} not joined, nothing to leave", topic);
            return Ok(false);
        }

        self.swarm
            .leave(topic)
            .await
            .map_err(|e| AuctionError::Swarm(format!("Failed to leave topic {topic}: {e}")))?;
        self.subscriptions.remove(topic);
        info!("Left topic {}", topic);
        Ok(true)
    }

    /// Send `message` to the other subscribers of its topic.
    ///
    /// Returns the number of peers reached; 0 when this peer is not
    /// subscribed to the topic.
    pub async fn broadcast(&self, message: &GossipMessage) -> AuctionResult<usize> {
        let topic = message.topic();
        if !self.subscriptions.contains(topic) {
            debug!(
                "Not broadcasting {} on {}: topic not joined",
                message.command(),
                topic
            );
            return Ok(0);
        }

        let data = message.to_bytes()?;
        let count = self
            .swarm
            .broadcast(topic, data)
            .await
            .map_err(|e| AuctionError::Swarm(format!("Broadcast on {topic} failed: {e}")))?;
        RelayStats::bump(&self.stats.sent);
        debug!(
            "Broadcast {} on {} to {} peers",
            message.command(),
            topic,
            count
        );
        Ok(count)
    }

    /// Publish a committed local transition. Delivery failures are logged,
    /// never returned: the local commit already happened.
    pub async fn publish(&self, transition: &Transition) -> usize {
        let message = match transition {
            Transition::BidAccepted {
                topic,
                amount,
                bidder,
            } => GossipMessage::Auction {
                topic: *topic,
                amount: *amount,
                client: bidder.clone(),
            },
            Transition::Settled {
                topic,
                amount,
                bidder,
            } => GossipMessage::Settle {
                topic: *topic,
                amount: *amount,
                client: bidder.clone(),
            },
            Transition::Unchanged => return 0,
        };

        match self.broadcast(&message).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to publish {}: {}", message.command(), e);
                0
            }
        }
    }

    /// Ask the other subscribers of `topic` for their current record.
    pub async fn request_sync(&self, topic: &Digest) -> usize {
        match self.broadcast(&GossipMessage::Sync { topic: *topic }).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to request sync for {}: {}", topic, e);
                0
            }
        }
    }

    /// Push a full record to the topic's current subscribers, so peers that
    /// joined before it existed pick it up.
    pub async fn announce(&self, auction: &Auction) -> usize {
        let message = GossipMessage::Snapshot {
            topic: auction.topic(),
            auction: auction.clone(),
        };
        match self.broadcast(&message).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to announce '{}': {}", auction.title, e);
                0
            }
        }
    }

    /// Decode one inbound message and apply it.
    pub async fn handle_inbound<K: KvStore>(
        &self,
        machine: &AuctionStateMachine<K>,
        inbound: InboundMessage,
    ) -> Disposition {
        RelayStats::bump(&self.stats.received);
        let from = short_id(&inbound.from);

        let message = match GossipMessage::decode(&inbound.data) {
            Decoded::Message(message) => message,
            Decoded::Dropped(reason) => return self.drop_message(from, reason),
        };
        if !self.subscriptions.contains(message.topic()) {
            return self.drop_message(from, DropReason::NotSubscribed);
        }

        let result = match message {
            GossipMessage::Auction {
                topic,
                amount,
                client,
            } => machine.apply_remote_bid(&topic, amount, &client).await,
            GossipMessage::Settle {
                topic,
                amount,
                client,
            } => {
                machine
                    .apply_remote_settle(&topic, amount, client.as_deref())
                    .await
            }
            GossipMessage::Snapshot { auction, .. } => machine.apply_snapshot(auction).await,
            GossipMessage::Sync { topic } => return self.answer_sync(machine, &topic, from).await,
        };

        match result {
            Ok(outcome) => {
                let counter = if outcome == ApplyOutcome::Applied {
                    &self.stats.applied
                } else {
                    &self.stats.stale
                };
                RelayStats::bump(counter);
                debug!("Message from {} handled: {:?}", from, outcome);
                Disposition::Handled(outcome)
            }
            Err(AuctionError::InvalidArgument(reason)) => {
                warn!("Rejected message from {}: {}", from, reason);
                RelayStats::bump(&self.stats.dropped);
                Disposition::Dropped(DropReason::Malformed)
            }
            Err(e) => {
                error!("Failed to apply message from {}: {}", from, e);
                RelayStats::bump(&self.stats.failed);
                Disposition::Failed
            }
        }
    }

    async fn answer_sync<K: KvStore>(
        &self,
        machine: &AuctionStateMachine<K>,
        topic: &Digest,
        from: &str,
    ) -> Disposition {
        let auction = match machine.get_by_topic(topic).await {
            Ok(Some(auction)) => auction,
            Ok(None) => {
                debug!("Sync request from {} for unknown topic {}", from, topic);
                return Disposition::NothingToShare;
            }
            Err(e) => {
                error!("Failed to read record for sync of {}: {}", topic, e);
                RelayStats::bump(&self.stats.failed);
                return Disposition::Failed;
            }
        };

        let reply = GossipMessage::Snapshot {
            topic: *topic,
            auction,
        };
        match self.broadcast(&reply).await {
            Ok(count) => {
                debug!("Answered sync from {} for {} ({} peers)", from, topic, count);
                Disposition::Answered
            }
            Err(e) => {
                warn!("Failed to answer sync for {}: {}", topic, e);
                RelayStats::bump(&self.stats.failed);
                Disposition::Failed
            }
        }
    }

    fn drop_message(&self, from: &str, reason: DropReason) -> Disposition {
        RelayStats::bump(&self.stats.dropped);
        match reason {
            DropReason::NotSubscribed | DropReason::UnknownCommand => {
                debug!("Dropped message from {}: {}", from, reason);
            }
            DropReason::Malformed | DropReason::BadTopic => {
                warn!("Dropped message from {}: {}", from, reason);
            }
        }
        Disposition::Dropped(reason)
    }

    /// Receive loop: apply inbound messages until cancelled or the overlay
    /// closes the channel.
    pub async fn run<K: KvStore>(
        self,
        machine: AuctionStateMachine<K>,
        mut inbound: UnboundedReceiver<InboundMessage>,
        token: CancellationToken,
    ) {
        let peer = self.swarm.local_peer();
        info!("Gossip relay started for peer {}", short_id(&peer));
        loop {
            tokio::select! {
                () = token.cancelled() => {
                    info!("Gossip relay for {} shutting down", short_id(&peer));
                    break;
                }
                message = inbound.recv() => {
                    let Some(message) = message else {
                        info!("Inbound channel closed for {}", short_id(&peer));
                        break;
                    };
                    self.handle_inbound(&machine, message).await;
                }
            }
        }
    }
}
