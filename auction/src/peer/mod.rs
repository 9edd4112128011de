pub mod auction_store;
pub mod coordinator;
pub mod gossip;
pub mod local_swarm;
pub mod log_store;
pub mod node;
pub mod relay;
pub mod state_machine;

pub use auction_store::AuctionStore;
pub use coordinator::{
    BidRequest, CoordinatorService, CreateRequest, PingRequest, PingResponse, TitleRequest,
};
pub use gossip::{Decoded, DropReason, GossipMessage};
pub use local_swarm::{LocalSwarm, LocalSwarmHub};
pub use log_store::LogStore;
pub use node::{load_or_create_identity, AuctionPeer, NodeIdentity};
pub use relay::{Disposition, GossipRelay, RelayStats, RelayStatsSnapshot, Subscriptions};
pub use state_machine::{ApplyOutcome, AuctionLocks, AuctionStateMachine, Transition};
