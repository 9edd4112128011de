//! Topic overlay abstraction for testable gossip.

use anyhow::Result;
use async_trait::async_trait;

use crate::crypto::Digest;

/// Hex identity of a peer on the overlay.
pub type PeerId = String;

/// A raw message delivered by the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The sending peer.
    pub from: PeerId,
    /// Undecoded message bytes.
    pub data: Vec<u8>,
}

/// Abstraction over a publish/subscribe overlay keyed by topic digest.
///
/// Inbound traffic is not part of the trait: implementations hand out an
/// `mpsc` receiver of [`InboundMessage`] when a peer connects.
#[async_trait]
pub trait TopicSwarm: Send + Sync + Clone + 'static {
    /// Identity of the local peer.
    fn local_peer(&self) -> PeerId;

    /// Join a topic. Resolves once the overlay has accepted the join locally.
    async fn join(&self, topic: &Digest) -> Result<()>;

    /// Leave a topic.
    async fn leave(&self, topic: &Digest) -> Result<()>;

    /// Send a message to every other peer subscribed to `topic`.
    ///
    /// Fire-and-forget; returns the number of peers the message was handed to.
    async fn broadcast(&self, topic: &Digest, message: Vec<u8>) -> Result<usize>;
}
