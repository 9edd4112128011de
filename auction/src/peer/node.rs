//! One running peer: identity, coordinator and the inbound receive loop.

use rand::RngCore;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::auction_store::AuctionStore;
use super::coordinator::CoordinatorService;
use super::relay::GossipRelay;
use super::state_machine::AuctionStateMachine;
use crate::config::{PEER_SEED_KEY, RPC_SEED_KEY, SEED_LEN};
use crate::crypto::hash;
use crate::error::{AuctionError, AuctionResult};
use crate::traits::{InboundMessage, KvStore, PeerId, TopicSwarm};
use crate::util::short_id;

/// Stable identities derived from seeds kept in the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Overlay identity (hex SHA-256 of the `dht-seed`)
    pub peer_id: PeerId,
    /// Address callers use for RPC (hex SHA-256 of the `rpc-seed`)
    pub rpc_key: String,
}

/// Load this peer's identity, generating and persisting seeds on first run.
pub async fn load_or_create_identity<K: KvStore>(
    store: &AuctionStore<K>,
) -> AuctionResult<NodeIdentity> {
    let peer_seed = load_or_create_seed(store, PEER_SEED_KEY).await?;
    let rpc_seed = load_or_create_seed(store, RPC_SEED_KEY).await?;
    Ok(NodeIdentity {
        peer_id: hash(&peer_seed).to_hex(),
        rpc_key: hash(&rpc_seed).to_hex(),
    })
}

async fn load_or_create_seed<K: KvStore>(
    store: &AuctionStore<K>,
    name: &str,
) -> AuctionResult<Vec<u8>> {
    if let Some(seed) = store.get_secret(name).await? {
        if seed.len() != SEED_LEN {
            return Err(AuctionError::Store(format!(
                "seed '{name}' has length {}, expected {SEED_LEN}",
                seed.len()
            )));
        }
        return Ok(seed);
    }

    let mut seed = vec![0u8; SEED_LEN];
    rand::thread_rng().fill_bytes(&mut seed);
    store.put_secret(name, seed.clone()).await?;
    info!("Generated new {}", name);
    Ok(seed)
}

/// A peer assembled from a store and an overlay handle.
pub struct AuctionPeer<K: KvStore, S: TopicSwarm> {
    peer_id: PeerId,
    coordinator: Arc<CoordinatorService<K, S>>,
    shutdown: CancellationToken,
}

impl<K: KvStore, S: TopicSwarm> AuctionPeer<K, S> {
    pub fn new(kv: K, swarm: S) -> Self {
        let peer_id = swarm.local_peer();
        let machine = AuctionStateMachine::new(AuctionStore::new(kv));
        let relay = GossipRelay::new(swarm);
        Self {
            peer_id,
            coordinator: Arc::new(CoordinatorService::new(machine, relay)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn coordinator(&self) -> Arc<CoordinatorService<K, S>> {
        Arc::clone(&self.coordinator)
    }

    /// Spawn the receive loop over `inbound`.
    pub fn start(&self, inbound: UnboundedReceiver<InboundMessage>) -> JoinHandle<()> {
        info!("Starting peer {}", short_id(&self.peer_id));
        let relay = self.coordinator.relay().clone();
        let machine = self.coordinator.machine().clone();
        tokio::spawn(relay.run(machine, inbound, self.shutdown.child_token()))
    }

    /// Stop the receive loop. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutting down peer {}", short_id(&self.peer_id));
            self.shutdown.cancel();
        }
    }
}
