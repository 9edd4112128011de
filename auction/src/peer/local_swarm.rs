//! In-process topic overlay shared by several peers in one process.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::crypto::Digest;
use crate::traits::{InboundMessage, PeerId, TopicSwarm};
use crate::util::short_id;

#[derive(Debug, Default)]
struct HubState {
    peers: HashMap<PeerId, UnboundedSender<InboundMessage>>,
    topics: HashMap<Digest, HashSet<PeerId>>,
}

/// Shared routing table for [`LocalSwarm`] handles.
#[derive(Debug, Clone, Default)]
pub struct LocalSwarmHub {
    state: Arc<RwLock<HubState>>,
}

impl LocalSwarmHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a peer. Messages for it arrive on the returned receiver.
    ///
    /// Reconnecting an id replaces its previous channel.
    pub fn connect(
        &self,
        peer_id: impl Into<PeerId>,
    ) -> (LocalSwarm, UnboundedReceiver<InboundMessage>) {
        let peer_id = peer_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.write().peers.insert(peer_id.clone(), tx);
        info!("Peer {} connected to local swarm", short_id(&peer_id));

        let swarm = LocalSwarm {
            peer_id,
            hub: self.clone(),
        };
        (swarm, rx)
    }

    /// Detach a peer and drop all of its subscriptions.
    pub fn disconnect(&self, peer_id: &str) {
        let mut state = self.state.write();
        state.peers.remove(peer_id);
        for members in state.topics.values_mut() {
            members.remove(peer_id);
        }
        state.topics.retain(|_, members| !members.is_empty());
        info!("Peer {} disconnected from local swarm", short_id(peer_id));
    }

    /// Peers currently subscribed to `topic`.
    pub fn subscribers(&self, topic: &Digest) -> Vec<PeerId> {
        self.state
            .read()
            .topics
            .get(topic)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn peer_count(&self) -> usize {
        self.state.read().peers.len()
    }
}

/// One peer's handle onto a [`LocalSwarmHub`].
#[derive(Debug, Clone)]
pub struct LocalSwarm {
    peer_id: PeerId,
    hub: LocalSwarmHub,
}

#[async_trait]
impl TopicSwarm for LocalSwarm {
    fn local_peer(&self) -> PeerId {
        self.peer_id.clone()
    }

    async fn join(&self, topic: &Digest) -> Result<()> {
        let mut state = self.hub.state.write();
        if !state.peers.contains_key(&self.peer_id) {
            return Err(anyhow!("peer {} is not connected", self.peer_id));
        }
        state
            .topics
            .entry(*topic)
            .or_default()
            .insert(self.peer_id.clone());
        Ok(())
    }

    async fn leave(&self, topic: &Digest) -> Result<()> {
        let mut state = self.hub.state.write();
        if let Some(members) = state.topics.get_mut(topic) {
            members.remove(&self.peer_id);
            if members.is_empty() {
                state.topics.remove(topic);
            }
        }
        Ok(())
    }

    async fn broadcast(&self, topic: &Digest, message: Vec<u8>) -> Result<usize> {
        let state = self.hub.state.read();
        let Some(members) = state.topics.get(topic) else {
            return Ok(0);
        };

        let mut delivered = 0;
        for member in members.iter().filter(|m| **m != self.peer_id) {
            let Some(tx) = state.peers.get(member) else {
                continue;
            };
            let inbound = InboundMessage {
                from: self.peer_id.clone(),
                data: message.clone(),
            };
            if tx.send(inbound).is_ok() {
                delivered += 1;
            } else {
                debug!("Peer {} receiver closed", short_id(member));
            }
        }
        Ok(delivered)
    }
}
