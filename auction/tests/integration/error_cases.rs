//! Rejections, malformed input and collaborator failures.

use crate::common::MultiPeerHarness;
use auction::mocks::MockStoreFailure;
use auction::peer::{Disposition, DropReason};
use auction::topic_id;
use serde_json::json;

#[tokio::test]
async fn test_missing_fields_leave_state_untouched() {
    let harness = MultiPeerHarness::new(1);
    harness.create(0, "Painting", 100).await;

    for (method, params) in [
        ("auction", json!({"title": "Painting", "amount": 150})),
        ("auction", json!({"title": "Painting", "client": "alice"})),
        ("auction", json!({"amount": 150, "client": "alice"})),
        ("settle", json!({"title": ""})),
        ("create", json!({"title": "Other"})),
    ] {
        assert_eq!(
            harness.call(0, method, params).await,
            json!("Missing fields"),
            "{method}"
        );
    }

    let record = harness.record(0, "Painting").await.unwrap();
    assert!(record.is_open());
    assert_eq!(record.highest_bid, 0);
    assert!(harness.record(0, "Other").await.is_none());
}

#[tokio::test]
async fn test_rejected_bids_are_not_broadcast() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    harness.bid(0, "Painting", 150, "alice").await;
    assert_eq!(harness.bid(0, "Painting", 150, "bob").await, json!("Bid too low"));
    assert_eq!(harness.bid(0, "Painting", 90, "bob").await, json!("Bid too low"));

    assert_eq!(harness.deliver_all().await, 1);
    let sent = harness.peer(0).service.relay().stats().sent;
    assert_eq!(sent, 3); // create announce, sync answer and the accepted bid
}

#[tokio::test]
async fn test_malformed_gossip_is_counted_and_dropped() {
    let harness = MultiPeerHarness::new(2);
    harness.create(1, "Painting", 100).await;
    let topic = topic_id("Painting").to_hex();

    let cases = [
        (b"{".to_vec(), DropReason::Malformed),
        (
            json!({"command": "refund", "topic": topic}).to_string().into_bytes(),
            DropReason::UnknownCommand,
        ),
        (
            json!({"command": "auction", "topic": "zz", "amount": 5, "client": "a"})
                .to_string()
                .into_bytes(),
            DropReason::BadTopic,
        ),
        (
            json!({"command": "auction", "topic": topic, "amount": "5", "client": "a"})
                .to_string()
                .into_bytes(),
            DropReason::Malformed,
        ),
    ];
    for (data, reason) in cases {
        assert_eq!(
            harness.receive_raw(1, 0, data).await,
            Disposition::Dropped(reason)
        );
    }

    let stats = harness.peer(1).service.relay().stats();
    assert_eq!(stats.received, 4);
    assert_eq!(stats.dropped, 4);
    assert_eq!(harness.record(1, "Painting").await.unwrap().highest_bid, 0);
}

#[tokio::test]
async fn test_store_failure_surfaces_as_internal_error() {
    let harness = MultiPeerHarness::new(1);
    harness.create(0, "Painting", 100).await;
    harness
        .peer(0)
        .kv
        .set_fail_mode(Some(MockStoreFailure::Writes))
        .await;

    assert_eq!(
        harness.bid(0, "Painting", 150, "alice").await,
        json!("Internal error")
    );
    assert_eq!(harness.settle(0, "Painting").await, json!("Internal error"));

    harness.peer(0).kv.set_fail_mode(None).await;
    let record = harness.record(0, "Painting").await.unwrap();
    assert!(record.is_open());
    assert_eq!(record.highest_bid, 0);
}

#[tokio::test]
async fn test_remote_store_failure_does_not_affect_sender() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 100).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    harness
        .peer(1)
        .kv
        .set_fail_mode(Some(MockStoreFailure::Writes))
        .await;
    assert_eq!(harness.bid(0, "Painting", 150, "alice").await, json!("OK"));
    assert_eq!(harness.deliver_to(1).await, vec![Disposition::Failed]);
    let stats = harness.peer(1).service.relay().stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.applied, 1); // the sync answer

    harness.peer(1).kv.set_fail_mode(None).await;
    assert_eq!(harness.record(0, "Painting").await.unwrap().highest_bid, 150);
    assert_eq!(harness.record(1, "Painting").await.unwrap().highest_bid, 0);
}

#[tokio::test]
async fn test_failed_pointer_write_leaves_auction_unreachable() {
    let harness = MultiPeerHarness::new(1);
    let pointer_key = topic_id("Painting").to_hex();
    harness
        .peer(0)
        .kv
        .set_fail_mode(Some(MockStoreFailure::OnKey(pointer_key)))
        .await;

    assert_eq!(
        harness.create(0, "Painting", 100).await,
        json!("Internal error")
    );
    assert_eq!(harness.peer(0).kv.key_count().await, 1);

    harness.peer(0).kv.set_fail_mode(None).await;
    assert!(harness.record(0, "Painting").await.is_none());

    // Retrying rewrites the same content-addressed record and adds the pointer.
    assert_eq!(harness.create(0, "Painting", 100).await, json!("OK"));
    assert_eq!(harness.peer(0).kv.key_count().await, 2);
}

#[tokio::test]
async fn test_unknown_method_and_malformed_request() {
    let harness = MultiPeerHarness::new(1);

    assert_eq!(
        harness.call(0, "withdraw", json!({})).await,
        json!("Unknown method")
    );

    let raw = harness.peer(0).service.handle("create", b"[1,2").await;
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&raw).unwrap(),
        json!("Malformed request")
    );
}
