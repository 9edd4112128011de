//! Delivery-order and duplication edge cases.

use crate::common::MultiPeerHarness;
use auction::peer::{ApplyOutcome, Disposition, DropReason};
use auction::topic_id;
use serde_json::json;

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    let bid = json!({
        "command": "auction",
        "topic": topic_id("Painting").to_hex(),
        "amount": 150,
        "client": "alice",
    })
    .to_string()
    .into_bytes();

    assert_eq!(
        harness.receive_raw(1, 0, bid.clone()).await,
        Disposition::Handled(ApplyOutcome::Applied)
    );
    assert_eq!(
        harness.receive_raw(1, 0, bid).await,
        Disposition::Handled(ApplyOutcome::Stale)
    );
    assert_eq!(harness.record(1, "Painting").await.unwrap().highest_bid, 150);
}

#[tokio::test]
async fn test_reordered_bids_keep_the_maximum() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    let topic = topic_id("Painting").to_hex();
    let high = json!({"command": "auction", "topic": topic, "amount": 300, "client": "carol"});
    let low = json!({"command": "auction", "topic": topic, "amount": 200, "client": "bob"});

    harness.receive_raw(1, 0, high.to_string().into_bytes()).await;
    let late = harness.receive_raw(1, 0, low.to_string().into_bytes()).await;
    assert_eq!(late, Disposition::Handled(ApplyOutcome::Stale));

    let record = harness.record(1, "Painting").await.unwrap();
    assert_eq!(record.highest_bid, 300);
    assert_eq!(record.highest_bidder.as_deref(), Some("carol"));
}

#[tokio::test]
async fn test_bid_arriving_after_settle_is_ignored() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    harness.bid(0, "Painting", 150, "alice").await;
    harness.settle(0, "Painting").await;

    // Peer 1 hears the bid and the settlement, then a replayed bid.
    let queued = harness.deliver_to(1).await;
    assert_eq!(
        queued,
        vec![
            Disposition::Handled(ApplyOutcome::Applied),
            Disposition::Handled(ApplyOutcome::Applied),
        ]
    );

    let replay = json!({
        "command": "auction",
        "topic": topic_id("Painting").to_hex(),
        "amount": 999,
        "client": "mallory",
    });
    assert_eq!(
        harness.receive_raw(1, 0, replay.to_string().into_bytes()).await,
        Disposition::Handled(ApplyOutcome::Closed)
    );

    let record = harness.record(1, "Painting").await.unwrap();
    assert!(record.is_settled());
    assert_eq!(record.highest_bid, 150);
}

#[tokio::test]
async fn test_lost_bid_is_repaired_by_settle_outcome() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    harness.bid(0, "Painting", 150, "alice").await;
    assert_eq!(harness.discard_pending(1), 1);

    harness.settle(0, "Painting").await;
    harness.deliver_all().await;

    let record = harness.record(1, "Painting").await.unwrap();
    assert!(record.is_settled());
    assert_eq!(record.highest_bid, 150);
    assert_eq!(record.highest_bidder.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_concurrent_equal_bids_keep_first_seen() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    assert_eq!(harness.bid(0, "Painting", 150, "alice").await, json!("OK"));
    assert_eq!(harness.bid(1, "Painting", 150, "bob").await, json!("OK"));
    harness.deliver_all().await;

    // No global order exists: each peer keeps the bid it accepted first.
    let a = harness.record(0, "Painting").await.unwrap();
    let b = harness.record(1, "Painting").await.unwrap();
    assert_eq!(a.highest_bid, 150);
    assert_eq!(b.highest_bid, 150);
    assert_eq!(a.highest_bidder.as_deref(), Some("alice"));
    assert_eq!(b.highest_bidder.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_gossip_for_unknown_topic_is_noop() {
    let mut harness = MultiPeerHarness::new(2);
    harness.join(1, "Ghost").await;
    harness.deliver_all().await;

    let bid = json!({
        "command": "auction",
        "topic": topic_id("Ghost").to_hex(),
        "amount": 10,
        "client": "alice",
    });
    assert_eq!(
        harness.receive_raw(1, 0, bid.to_string().into_bytes()).await,
        Disposition::Handled(ApplyOutcome::UnknownTopic)
    );
    assert_eq!(harness.peer(1).kv.key_count().await, 0);
}

#[tokio::test]
async fn test_gossip_for_unjoined_topic_dropped() {
    let harness = MultiPeerHarness::new(2);
    harness.create(1, "Painting", 100).await;
    harness.leave(1, "Painting").await;

    let bid = json!({
        "command": "auction",
        "topic": topic_id("Painting").to_hex(),
        "amount": 150,
        "client": "alice",
    });
    assert_eq!(
        harness.receive_raw(1, 0, bid.to_string().into_bytes()).await,
        Disposition::Dropped(DropReason::NotSubscribed)
    );
    assert_eq!(harness.record(1, "Painting").await.unwrap().highest_bid, 0);
}

#[tokio::test]
async fn test_join_is_idempotent_across_calls() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;

    assert_eq!(harness.join(1, "Painting").await, json!("OK"));
    assert_eq!(harness.join(1, "Painting").await, json!("OK"));
    assert_eq!(harness.hub().subscribers(&topic_id("Painting")).len(), 2);

    // One sync request, one snapshot answer.
    assert_eq!(harness.deliver_all().await, 2);
}

#[tokio::test]
async fn test_bid_on_peer_without_record() {
    let harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;

    assert_eq!(
        harness.bid(1, "Painting", 150, "alice").await,
        json!("Not found")
    );
    assert_eq!(harness.peer(1).kv.key_count().await, 0);
}
