use serde::{Deserialize, Serialize};

use crate::config::{MAX_BIDDER_LEN, MAX_RECORD_SIZE, MAX_TITLE_LEN};
use crate::crypto::{hash, topic_id, Digest};
use crate::error::{AuctionError, AuctionResult};

/// Status of an auction. `Settled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuctionStatus {
    /// Accepting bids
    Open,
    /// Outcome fixed; no further transitions
    Settled,
}

/// Creation-time snapshot whose digest becomes the record id.
///
/// Field order is the serialization order and must not change, or every
/// existing record id stops matching its content.
#[derive(Serialize)]
struct InitialSnapshot<'a> {
    title: &'a str,
    amount: u64,
    status: AuctionStatus,
}

/// A locally persisted auction record.
///
/// Serialized as `{title, amount, id, highestBid, client, status}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    /// Title of the item (also the source of the topic id)
    pub title: String,

    /// Starting amount set at creation
    pub amount: u64,

    /// Digest of the initial snapshot; the record's storage key
    pub id: Digest,

    /// Highest accepted bid, 0 until the first bid
    pub highest_bid: u64,

    /// Identity of the leading bidder
    #[serde(rename = "client")]
    pub highest_bidder: Option<String>,

    /// Current status of the auction
    pub status: AuctionStatus,
}

impl Auction {
    /// Build a fresh OPEN auction, validating title and starting amount.
    pub fn open(title: &str, amount: u64) -> AuctionResult<Self> {
        validate_title(title)?;
        if amount == 0 {
            return Err(AuctionError::InvalidArgument(
                "starting amount must be positive".into(),
            ));
        }

        Ok(Self {
            title: title.to_string(),
            amount,
            id: Self::snapshot_id(title, amount)?,
            highest_bid: 0,
            highest_bidder: None,
            status: AuctionStatus::Open,
        })
    }

    /// Record id for an auction created with `title` and `amount`.
    pub fn snapshot_id(title: &str, amount: u64) -> AuctionResult<Digest> {
        let snapshot = InitialSnapshot {
            title,
            amount,
            status: AuctionStatus::Open,
        };
        let bytes = crate::util::json_to_vec(&snapshot)?;
        Ok(hash(&bytes))
    }

    /// Topic id derived from the title.
    pub fn topic(&self) -> Digest {
        topic_id(&self.title)
    }

    pub fn is_open(&self) -> bool {
        self.status == AuctionStatus::Open
    }

    pub fn is_settled(&self) -> bool {
        self.status == AuctionStatus::Settled
    }

    /// Whether `id` is really the digest of this record's creation snapshot.
    pub fn has_valid_id(&self) -> bool {
        Self::snapshot_id(&self.title, self.amount).is_ok_and(|id| id == self.id)
    }

    /// Accept a bid if the auction is open and the amount strictly exceeds
    /// the current highest bid.
    pub fn accept_bid(&mut self, amount: u64, bidder: &str) -> AuctionResult<()> {
        if self.is_settled() {
            return Err(AuctionError::AuctionSettled(self.title.clone()));
        }
        if amount <= self.highest_bid {
            return Err(AuctionError::BidTooLow {
                amount,
                highest: self.highest_bid,
            });
        }
        self.highest_bid = amount;
        self.highest_bidder = Some(bidder.to_string());
        Ok(())
    }

    /// Move to SETTLED. Returns `false` if already settled.
    pub fn settle(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }
        self.status = AuctionStatus::Settled;
        true
    }

    /// Whether `other` (same auction) carries strictly newer state than `self`.
    ///
    /// Settlement dominates; otherwise the higher bid wins.
    pub fn is_superseded_by(&self, other: &Self) -> bool {
        match (self.status, other.status) {
            (AuctionStatus::Settled, _) => false,
            (AuctionStatus::Open, AuctionStatus::Settled) => true,
            (AuctionStatus::Open, AuctionStatus::Open) => other.highest_bid > self.highest_bid,
        }
    }

    /// Serialize the record to JSON bytes
    pub fn to_bytes(&self) -> AuctionResult<Vec<u8>> {
        crate::util::json_to_vec(self)
    }

    /// Deserialize a record from JSON bytes
    pub fn from_bytes(data: &[u8]) -> AuctionResult<Self> {
        crate::util::json_from_limited(data, MAX_RECORD_SIZE)
    }
}

/// Reject empty, whitespace-only, or overlong titles.
pub fn validate_title(title: &str) -> AuctionResult<()> {
    if title.trim().is_empty() {
        return Err(AuctionError::InvalidArgument("title is required".into()));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(AuctionError::InvalidArgument(format!(
            "title is {} bytes (max {MAX_TITLE_LEN})",
            title.len()
        )));
    }
    Ok(())
}

/// Reject empty or overlong bidder identities.
pub fn validate_bidder(bidder: &str) -> AuctionResult<()> {
    if bidder.trim().is_empty() {
        return Err(AuctionError::InvalidArgument("client is required".into()));
    }
    if bidder.len() > MAX_BIDDER_LEN {
        return Err(AuctionError::InvalidArgument(format!(
            "client is {} bytes (max {MAX_BIDDER_LEN})",
            bidder.len()
        )));
    }
    Ok(())
}

/// Check a record received from elsewhere against the local field limits.
pub fn validate_record(auction: &Auction) -> AuctionResult<()> {
    validate_title(&auction.title)?;
    if let Some(bidder) = &auction.highest_bidder {
        validate_bidder(bidder)?;
    }
    Ok(())
}
