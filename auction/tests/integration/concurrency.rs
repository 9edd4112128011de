//! Concurrent callers and running receive loops.

use std::time::Duration;

use crate::common::MultiPeerHarness;
use auction::mocks::{make_test_peer_id, MockStore};
use auction::peer::{AuctionPeer, LocalSwarmHub, LogStore};
use auction::topic_id;
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bids_then_gossip_converge() {
    let mut harness = MultiPeerHarness::new(2);
    harness.create(0, "Painting", 1).await;
    harness.join(1, "Painting").await;
    harness.deliver_all().await;

    let service = harness.peer(0).service.clone();
    let mut handles = Vec::new();
    for amount in 1..=50u64 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let params = json!({"title": "Painting", "amount": amount, "client": format!("c{amount}")});
            service.handle("auction", params.to_string().as_bytes()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    harness.deliver_all().await;

    for index in 0..2 {
        let record = harness.record(index, "Painting").await.unwrap();
        assert_eq!(record.highest_bid, 50, "peer {index}");
        assert_eq!(record.highest_bidder.as_deref(), Some("c50"), "peer {index}");
    }
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_running_peers_converge() {
    let hub = LocalSwarmHub::new();
    let mut peers = Vec::new();
    for id in 1..=3u8 {
        let (swarm, inbound) = hub.connect(make_test_peer_id(id));
        let peer = AuctionPeer::new(MockStore::new(), swarm);
        let handle = peer.start(inbound);
        peers.push((peer, handle));
    }
    let topic = topic_id("Painting");

    peers[0]
        .0
        .coordinator()
        .handle("create", br#"{"title":"Painting","amount":100}"#)
        .await;
    for (peer, _) in &peers[1..] {
        peer.coordinator()
            .handle("join", br#"{"title":"Painting"}"#)
            .await;
    }
    for (peer, _) in &peers[1..] {
        let machine = peer.coordinator().machine().clone();
        wait_for(|| {
            let machine = machine.clone();
            async move { machine.get_by_topic(&topic).await.unwrap().is_some() }
        })
        .await;
    }

    peers[2]
        .0
        .coordinator()
        .handle("auction", br#"{"title":"Painting","amount":250,"client":"zoe"}"#)
        .await;
    peers[1].0.coordinator().handle("settle", br#"{"title":"Painting"}"#).await;

    for (peer, _) in &peers {
        let machine = peer.coordinator().machine().clone();
        wait_for(|| {
            let machine = machine.clone();
            async move {
                machine
                    .get_by_topic(&topic)
                    .await
                    .unwrap()
                    .is_some_and(|a| a.is_settled())
            }
        })
        .await;
    }

    for (peer, handle) in peers {
        peer.shutdown();
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_log_backed_peer_restarts_with_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peer-0").join("auction.log");
    let hub = LocalSwarmHub::new();

    {
        let (swarm, inbound) = hub.connect(make_test_peer_id(1));
        let peer = AuctionPeer::new(LogStore::open(&path).await.unwrap(), swarm);
        let handle = peer.start(inbound);
        let coordinator = peer.coordinator();
        coordinator
            .handle("create", br#"{"title":"Painting","amount":100}"#)
            .await;
        coordinator
            .handle("auction", br#"{"title":"Painting","amount":150,"client":"alice"}"#)
            .await;
        peer.shutdown();
        handle.await.unwrap();
        hub.disconnect(&make_test_peer_id(1));
    }

    let (swarm, _inbound) = hub.connect(make_test_peer_id(1));
    let peer = AuctionPeer::new(LogStore::open(&path).await.unwrap(), swarm);
    let raw = peer
        .coordinator()
        .handle("get", br#"{"title":"Painting"}"#)
        .await;
    let record: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(record["highestBid"], 150);
    assert_eq!(record["client"], "alice");
    assert_eq!(record["status"], "OPEN");
}
