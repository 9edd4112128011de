//! Mock implementations for testing.
//!
//! This module provides mock implementations of the trait abstractions
//! that allow unit testing without external dependencies.

pub mod store;
pub mod swarm;

pub use store::{MockStore, MockStoreFailure};
pub use swarm::{MockSwarm, RecordedBroadcast};

/// Deterministic peer id for tests.
pub fn make_test_peer_id(id: u8) -> crate::traits::PeerId {
    hex::encode([id; 8])
}
