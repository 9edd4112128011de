//! Cross-peer convergence through topic gossip.

use crate::common::MultiPeerHarness;
use auction::AuctionStatus;
use serde_json::json;

#[tokio::test]
async fn test_bid_reaches_joined_peer() {
    let mut harness = MultiPeerHarness::new(2);

    assert_eq!(harness.create(0, "Painting", 100).await, json!("OK"));
    assert_eq!(harness.join(1, "Painting").await, json!("OK"));
    harness.deliver_all().await;

    assert_eq!(harness.bid(0, "Painting", 150, "alice").await, json!("OK"));
    harness.deliver_all().await;

    let a = harness.record(0, "Painting").await.unwrap();
    let b = harness.record(1, "Painting").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(b.highest_bid, 150);
    assert_eq!(b.highest_bidder.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_subscriber_before_create_receives_record() {
    let mut harness = MultiPeerHarness::new(2);

    assert_eq!(harness.join(1, "Painting").await, json!("OK"));
    harness.deliver_all().await;
    assert!(harness.record(1, "Painting").await.is_none());

    assert_eq!(harness.create(0, "Painting", 100).await, json!("OK"));
    assert_eq!(harness.deliver_all().await, 1);
    assert_eq!(
        harness.record(1, "Painting").await,
        harness.record(0, "Painting").await
    );

    assert_eq!(harness.bid(0, "Painting", 150, "alice").await, json!("OK"));
    harness.deliver_all().await;

    let a = harness.record(0, "Painting").await.unwrap();
    let b = harness.record(1, "Painting").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(b.highest_bid, 150);
}

#[tokio::test]
async fn test_settlement_propagates() {
    let mut harness = MultiPeerHarness::new(3);

    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.join(2, "Painting").await;
    harness.deliver_all().await;

    harness.bid(1, "Painting", 150, "alice").await;
    harness.deliver_all().await;
    harness.bid(2, "Painting", 175, "bob").await;
    harness.deliver_all().await;

    assert_eq!(harness.settle(0, "Painting").await, json!("OK"));
    harness.deliver_all().await;

    for index in 0..harness.num_peers() {
        let record = harness.record(index, "Painting").await.unwrap();
        assert_eq!(record.status, AuctionStatus::Settled, "peer {index}");
        assert_eq!(record.highest_bid, 175, "peer {index}");
        assert_eq!(record.highest_bidder.as_deref(), Some("bob"), "peer {index}");
    }

    assert_eq!(
        harness.bid(1, "Painting", 500, "carol").await,
        json!("Auction settled")
    );
}

#[tokio::test]
async fn test_bids_from_every_peer_converge_on_maximum() {
    let mut harness = MultiPeerHarness::new(4);

    harness.create(0, "Vase", 10).await;
    for index in 1..4 {
        harness.join(index, "Vase").await;
    }
    harness.deliver_all().await;

    // Bids placed before any delivery: each peer only sees its own at first.
    harness.bid(1, "Vase", 20, "p1").await;
    harness.bid(2, "Vase", 40, "p2").await;
    harness.bid(3, "Vase", 30, "p3").await;
    harness.deliver_all().await;

    for index in 0..4 {
        let record = harness.record(index, "Vase").await.unwrap();
        assert_eq!(record.highest_bid, 40, "peer {index}");
        assert_eq!(record.highest_bidder.as_deref(), Some("p2"), "peer {index}");
    }
}

#[tokio::test]
async fn test_late_joiner_catches_up() {
    let mut harness = MultiPeerHarness::new(3);

    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;
    harness.bid(1, "Painting", 150, "alice").await;
    harness.deliver_all().await;

    // Peer 2 missed the bid broadcast entirely.
    assert!(harness.record(2, "Painting").await.is_none());

    harness.join(2, "Painting").await;
    harness.deliver_all().await;

    let late = harness.record(2, "Painting").await.unwrap();
    assert_eq!(late, harness.record(0, "Painting").await.unwrap());
    assert_eq!(late.highest_bid, 150);

    // Once caught up, live gossip applies as usual.
    harness.bid(2, "Painting", 200, "dave").await;
    harness.deliver_all().await;
    for index in 0..3 {
        let record = harness.record(index, "Painting").await.unwrap();
        assert_eq!(record.highest_bid, 200, "peer {index}");
    }
}

#[tokio::test]
async fn test_late_joiner_after_settlement() {
    let mut harness = MultiPeerHarness::new(2);

    harness.create(0, "Painting", 100).await;
    harness.bid(0, "Painting", 120, "alice").await;
    harness.settle(0, "Painting").await;

    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    let record = harness.record(1, "Painting").await.unwrap();
    assert!(record.is_settled());
    assert_eq!(record.highest_bid, 120);
}

#[tokio::test]
async fn test_left_peer_stops_receiving() {
    let mut harness = MultiPeerHarness::new(2);

    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    assert_eq!(harness.leave(1, "Painting").await, json!("OK"));
    harness.bid(0, "Painting", 150, "alice").await;
    harness.deliver_all().await;

    let stale = harness.record(1, "Painting").await.unwrap();
    assert_eq!(stale.highest_bid, 0);

    // Rejoining pulls the missed state back in.
    harness.join(1, "Painting").await;
    harness.deliver_all().await;
    assert_eq!(harness.record(1, "Painting").await.unwrap().highest_bid, 150);
}

#[tokio::test]
async fn test_independent_auctions_do_not_interfere() {
    let mut harness = MultiPeerHarness::new(2);

    harness.create(0, "Painting", 100).await;
    harness.create(1, "Sculpture", 50).await;
    harness.join(1, "Painting").await;
    harness.join(0, "Sculpture").await;
    harness.deliver_all().await;

    harness.bid(1, "Painting", 150, "alice").await;
    harness.bid(0, "Sculpture", 60, "bob").await;
    harness.deliver_all().await;

    for index in 0..2 {
        let painting = harness.record(index, "Painting").await.unwrap();
        let sculpture = harness.record(index, "Sculpture").await.unwrap();
        assert_eq!(painting.highest_bidder.as_deref(), Some("alice"));
        assert_eq!(sculpture.highest_bidder.as_deref(), Some("bob"));
    }
}
