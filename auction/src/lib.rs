pub mod config;
pub mod crypto;
pub mod error;
pub mod marketplace;
pub mod peer;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use config::NodeConfig;
pub use crypto::{hash, topic_id, Digest};
pub use error::{AuctionError, AuctionResult};
pub use marketplace::{Auction, AuctionStatus};
pub use peer::{
    ApplyOutcome, AuctionPeer, AuctionStateMachine, AuctionStore, CoordinatorService,
    GossipMessage, GossipRelay, LocalSwarm, LocalSwarmHub, LogStore, Transition,
};
pub use traits::{InboundMessage, KvStore, PeerId, TopicSwarm};
