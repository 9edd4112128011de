//! Peer-facing operation surface.
//!
//! Each public method corresponds to one RPC method name; [`CoordinatorService::handle`]
//! dispatches raw JSON request bodies the way an RPC responder would.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::relay::GossipRelay;
use super::state_machine::AuctionStateMachine;
use crate::config::MAX_MESSAGE_SIZE;
use crate::crypto::topic_id;
use crate::error::{AuctionError, AuctionResult};
use crate::marketplace::auction::validate_title;
use crate::marketplace::Auction;
use crate::traits::{KvStore, TopicSwarm};
use crate::util::json_from_limited;

/// Acknowledgement returned by every successful mutating call.
pub const OK: &str = "OK";

/// Response for a method name the service does not expose.
pub const UNKNOWN_METHOD: &str = "Unknown method";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingRequest {
    pub nonce: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub nonce: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRequest {
    pub title: Option<String>,
    pub amount: Option<u64>,
}

/// Request body for join, leave, settle and get.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TitleRequest {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BidRequest {
    pub title: Option<String>,
    pub amount: Option<u64>,
    pub client: Option<String>,
}

fn required<T>(field: Option<T>, name: &str) -> AuctionResult<T> {
    field.ok_or_else(|| AuctionError::InvalidArgument(format!("{name} is required")))
}

fn required_title(title: Option<String>) -> AuctionResult<String> {
    let title = required(title, "title")?;
    validate_title(&title)?;
    Ok(title)
}

/// Coordinates the state machine and gossip relay for one peer.
#[derive(Debug, Clone)]
pub struct CoordinatorService<K: KvStore, S: TopicSwarm> {
    machine: AuctionStateMachine<K>,
    relay: GossipRelay<S>,
}

impl<K: KvStore, S: TopicSwarm> CoordinatorService<K, S> {
    pub const fn new(machine: AuctionStateMachine<K>, relay: GossipRelay<S>) -> Self {
        Self { machine, relay }
    }

    pub const fn machine(&self) -> &AuctionStateMachine<K> {
        &self.machine
    }

    pub const fn relay(&self) -> &GossipRelay<S> {
        &self.relay
    }

    /// Liveness check: answers with `nonce + 1`.
    pub fn ping(&self, request: PingRequest) -> AuctionResult<PingResponse> {
        info!("Ping RPC called");
        let nonce = required(request.nonce, "nonce")?;
        Ok(PingResponse {
            nonce: nonce.wrapping_add(1),
        })
    }

    /// Create an auction and subscribe to its topic.
    pub async fn create(&self, request: CreateRequest) -> AuctionResult<()> {
        info!("Create RPC called");
        let title = required_title(request.title)?;
        let amount = required(request.amount, "amount")?;

        let auction = self.machine.create(&title, amount).await?;

        // The auction exists from here on; a failed subscription is retried
        // by a later join, not by recreating.
        if let Err(e) = self.relay.join(&auction.topic()).await {
            warn!("Created '{}' but could not join its topic: {}", title, e);
            return Ok(());
        }
        let reached = self.relay.announce(&auction).await;
        debug!("Announced '{}' to {} peers", title, reached);
        Ok(())
    }

    /// Subscribe to an auction's topic and ask current subscribers for
    /// their record.
    pub async fn join(&self, request: TitleRequest) -> AuctionResult<()> {
        info!("Join RPC called");
        let title = required_title(request.title)?;
        let topic = topic_id(&title);

        if self.relay.join(&topic).await? {
            let asked = self.relay.request_sync(&topic).await;
            debug!("Requested sync for '{}' from {} peers", title, asked);
        }
        Ok(())
    }

    pub async fn leave(&self, request: TitleRequest) -> AuctionResult<()> {
        info!("Leave RPC called");
        let title = required_title(request.title)?;
        self.relay.leave(&topic_id(&title)).await?;
        Ok(())
    }

    /// Place a bid and broadcast it.
    pub async fn auction(&self, request: BidRequest) -> AuctionResult<()> {
        info!("Auction RPC called");
        let title = required_title(request.title)?;
        let amount = required(request.amount, "amount")?;
        let client = required(request.client, "client")?;

        let transition = self.machine.bid(&title, amount, &client).await?;
        self.relay.publish(&transition).await;
        Ok(())
    }

    /// Settle an auction and broadcast the outcome.
    pub async fn settle(&self, request: TitleRequest) -> AuctionResult<()> {
        info!("Settle RPC called");
        let title = required_title(request.title)?;

        let transition = self.machine.settle(&title).await?;
        self.relay.publish(&transition).await;
        Ok(())
    }

    /// Read the local record for an auction.
    pub async fn get(&self, request: TitleRequest) -> AuctionResult<Auction> {
        info!("Get RPC called");
        let title = required_title(request.title)?;
        self.machine
            .get(&title)
            .await?
            .ok_or(AuctionError::NotFound(title))
    }

    /// Dispatch a raw JSON request for `method` and encode the response.
    pub async fn handle(&self, method: &str, request: &[u8]) -> Vec<u8> {
        let response = match method {
            "ping" => match decode(request).and_then(|r| self.ping(r)) {
                Ok(pong) => serde_json::to_value(pong).unwrap_or(Value::Null),
                Err(e) => failure(method, &e),
            },
            "create" => acknowledge(method, self.create_raw(request).await),
            "join" => acknowledge(method, self.join_raw(request).await),
            "leave" => acknowledge(method, self.leave_raw(request).await),
            "auction" => acknowledge(method, self.auction_raw(request).await),
            "settle" => acknowledge(method, self.settle_raw(request).await),
            "get" => match self.get_raw(request).await {
                Ok(auction) => serde_json::to_value(auction).unwrap_or(Value::Null),
                Err(e) => failure(method, &e),
            },
            other => {
                warn!("Unknown RPC method '{}'", other);
                Value::from(UNKNOWN_METHOD)
            }
        };
        serde_json::to_vec(&response).unwrap_or_default()
    }

    async fn create_raw(&self, request: &[u8]) -> AuctionResult<()> {
        self.create(decode(request)?).await
    }

    async fn join_raw(&self, request: &[u8]) -> AuctionResult<()> {
        self.join(decode(request)?).await
    }

    async fn leave_raw(&self, request: &[u8]) -> AuctionResult<()> {
        self.leave(decode(request)?).await
    }

    async fn auction_raw(&self, request: &[u8]) -> AuctionResult<()> {
        self.auction(decode(request)?).await
    }

    async fn settle_raw(&self, request: &[u8]) -> AuctionResult<()> {
        self.settle(decode(request)?).await
    }

    async fn get_raw(&self, request: &[u8]) -> AuctionResult<Auction> {
        self.get(decode(request)?).await
    }
}

fn decode<T: serde::de::DeserializeOwned>(request: &[u8]) -> AuctionResult<T> {
    json_from_limited(request, MAX_MESSAGE_SIZE)
}

fn acknowledge(method: &str, result: AuctionResult<()>) -> Value {
    match result {
        Ok(()) => Value::from(OK),
        Err(e) => failure(method, &e),
    }
}

fn failure(method: &str, error: &AuctionError) -> Value {
    if error.is_rejection() {
        debug!("{} rejected: {}", method, error);
    } else {
        warn!("{} failed: {}", method, error);
    }
    Value::from(error.wire_message())
}
