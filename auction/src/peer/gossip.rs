use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::MAX_MESSAGE_SIZE;
use crate::crypto::Digest;
use crate::error::AuctionResult;
use crate::marketplace::auction::validate_bidder;
use crate::marketplace::Auction;
use crate::util::json_to_vec;

/// Commands this peer understands. Anything else is dropped.
const KNOWN_COMMANDS: [&str; 4] = ["auction", "settle", "sync", "snapshot"];

/// Messages exchanged between subscribers of an auction topic.
///
/// Encoded as a flat JSON object tagged by `command`, e.g.
/// `{"command":"auction","topic":"<hex>","amount":150,"client":"alice"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum GossipMessage {
    /// A bid accepted by the sender
    Auction {
        topic: Digest,
        amount: u64,
        client: String,
    },

    /// The sender settled the auction with this final outcome
    Settle {
        topic: Digest,
        amount: u64,
        client: Option<String>,
    },

    /// A newly joined peer asking subscribers for their record
    Sync { topic: Digest },

    /// A full record sent in answer to `Sync`
    Snapshot { topic: Digest, auction: Auction },
}

impl GossipMessage {
    pub const fn topic(&self) -> &Digest {
        match self {
            Self::Auction { topic, .. }
            | Self::Settle { topic, .. }
            | Self::Sync { topic }
            | Self::Snapshot { topic, .. } => topic,
        }
    }

    pub const fn command(&self) -> &'static str {
        match self {
            Self::Auction { .. } => "auction",
            Self::Settle { .. } => "settle",
            Self::Sync { .. } => "sync",
            Self::Snapshot { .. } => "snapshot",
        }
    }

    pub fn to_bytes(&self) -> AuctionResult<Vec<u8>> {
        json_to_vec(self)
    }

    /// Decode an inbound message, classifying anything unusable.
    pub fn decode(data: &[u8]) -> Decoded {
        if data.len() > MAX_MESSAGE_SIZE {
            return Decoded::Dropped(DropReason::Malformed);
        }

        let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
            return Decoded::Dropped(DropReason::Malformed);
        };

        match value.get("command").and_then(|c| c.as_str()) {
            Some(command) if KNOWN_COMMANDS.contains(&command) => {}
            Some(_) => return Decoded::Dropped(DropReason::UnknownCommand),
            None => return Decoded::Dropped(DropReason::Malformed),
        }

        match value.get("topic").and_then(|t| t.as_str()) {
            Some(topic) if Digest::from_hex(topic).is_ok() => {}
            _ => return Decoded::Dropped(DropReason::BadTopic),
        }

        let Ok(message) = serde_json::from_value::<Self>(value) else {
            return Decoded::Dropped(DropReason::Malformed);
        };

        let invalid = match &message {
            Self::Auction { amount, client, .. } => *amount == 0 || validate_bidder(client).is_err(),
            Self::Settle {
                client: Some(client),
                ..
            } => validate_bidder(client).is_err(),
            Self::Snapshot { topic, auction } => {
                if *topic != auction.topic() {
                    return Decoded::Dropped(DropReason::BadTopic);
                }
                false
            }
            _ => false,
        };
        if invalid {
            return Decoded::Dropped(DropReason::Malformed);
        }
        Decoded::Message(message)
    }
}

/// Why an inbound message was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Oversized, not JSON, or missing/ill-typed fields
    Malformed,
    /// Valid JSON with a command this peer does not handle
    UnknownCommand,
    /// Missing or non-hex topic, or a snapshot filed under the wrong topic
    BadTopic,
    /// Well-formed, but for a topic this peer has not joined
    NotSubscribed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::BadTopic => write!(f, "bad topic"),
            Self::NotSubscribed => write!(f, "not subscribed"),
        }
    }
}

/// Result of decoding one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(GossipMessage),
    Dropped(DropReason),
}
