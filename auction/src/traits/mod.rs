//! Trait abstractions for the external collaborators.
//!
//! The key-value store and the topic overlay are injected behind these
//! traits so the auction protocol can be exercised without a real disk or
//! network.

pub mod store;
pub mod swarm;

pub use store::KvStore;
pub use swarm::{InboundMessage, PeerId, TopicSwarm};
