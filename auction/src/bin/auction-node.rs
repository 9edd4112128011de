//! Headless devnet runner.
//!
//! Starts N peers on one in-process overlay, each with its own log-backed
//! store, and drives them with JSON-over-stdio commands. Logging goes to
//! stderr; stdout is reserved for the command protocol.
//!
//! Usage:
//!   auction-node [--peers N] [--data-dir PATH]
//!
//! On startup, emits a `Ready` JSON line listing the peers. Then reads lines
//! like `{"peer":0,"method":"create","params":{"title":"Painting","amount":100}}`
//! and answers each with `{"peer":0,"response":"OK"}`.

use std::io::Write;

use anyhow::{Context, Result};
use auction::config::{NodeConfig, DEFAULT_LOG_FILTER};
use auction::peer::{
    load_or_create_identity, AuctionPeer, AuctionStore, LocalSwarm, LocalSwarmHub, LogStore,
};
use tokio::task::JoinHandle;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ── IPC types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PeerInfo {
    index: usize,
    peer_id: String,
    rpc_key: String,
}

#[derive(Serialize)]
struct ReadyEvent {
    event: &'static str,
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct Command {
    #[serde(default)]
    peer: usize,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Reply {
    Response {
        peer: usize,
        response: serde_json::Value,
    },
    Error {
        error: String,
    },
}

// ── Helpers ──────────────────────────────────────────────────────────

fn init_logging_stderr() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

fn emit_json(value: &impl Serialize) -> Result<()> {
    let line = serde_json::to_string(value).context("JSON serialization failed")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").context("stdout write failed")?;
    stdout.flush().context("stdout flush failed")?;
    Ok(())
}

type DevnetPeer = AuctionPeer<LogStore, LocalSwarm>;

struct Devnet {
    peers: Vec<DevnetPeer>,
    loops: Vec<JoinHandle<()>>,
    infos: Vec<PeerInfo>,
}

async fn start_peers(config: &NodeConfig, hub: &LocalSwarmHub) -> Result<Devnet> {
    let mut peers = Vec::with_capacity(config.peers);
    let mut loops = Vec::with_capacity(config.peers);
    let mut infos = Vec::with_capacity(config.peers);

    for index in 0..config.peers {
        let kv = LogStore::open(config.peer_store_path(index)).await?;
        let identity = load_or_create_identity(&AuctionStore::new(kv.clone())).await?;
        let (swarm, inbound) = hub.connect(identity.peer_id.clone());

        let peer = AuctionPeer::new(kv, swarm);
        loops.push(peer.start(inbound));
        info!("Peer {} is {}", index, identity.peer_id);

        infos.push(PeerInfo {
            index,
            peer_id: identity.peer_id,
            rpc_key: identity.rpc_key,
        });
        peers.push(peer);
    }
    Ok(Devnet {
        peers,
        loops,
        infos,
    })
}

// ── Main ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env()?.apply_args(std::env::args().skip(1))?;
    init_logging_stderr();
    info!(
        "auction-node starting ({} peers, data dir {})",
        config.peers,
        config.data_dir.display()
    );

    let hub = LocalSwarmHub::new();
    let Devnet {
        peers,
        loops,
        infos,
    } = start_peers(&config, &hub).await?;

    emit_json(&ReadyEvent {
        event: "Ready",
        peers: infos,
    })?;
    info!("Ready event emitted");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => {
                info!("stdin closed, shutting down");
                break;
            }
            Err(e) => {
                error!("stdin read error: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command: Command = match serde_json::from_str(&line) {
            Ok(c) => c,
            Err(e) => {
                emit_json(&Reply::Error {
                    error: format!("Invalid command JSON: {e}"),
                })?;
                continue;
            }
        };

        if command.method == "shutdown" {
            info!("Shutdown command received");
            emit_json(&Reply::Response {
                peer: command.peer,
                response: serde_json::Value::from("OK"),
            })?;
            break;
        }

        let Some(peer) = peers.get(command.peer) else {
            warn!("Command for unknown peer {}", command.peer);
            emit_json(&Reply::Error {
                error: format!("No peer with index {}", command.peer),
            })?;
            continue;
        };

        let response = if command.method == "stats" {
            serde_json::to_value(peer.coordinator().relay().stats())?
        } else {
            let params = if command.params.is_null() {
                serde_json::json!({})
            } else {
                command.params
            };
            let body = serde_json::to_vec(&params)?;
            let raw = peer.coordinator().handle(&command.method, &body).await;
            serde_json::from_slice(&raw)?
        };

        emit_json(&Reply::Response {
            peer: command.peer,
            response,
        })?;
    }

    for peer in &peers {
        peer.shutdown();
    }
    // Let in-flight messages finish applying before the stores are dropped.
    for (index, handle) in loops.into_iter().enumerate() {
        if let Err(e) = handle.await {
            error!("Receive loop of peer {} ended abnormally: {}", index, e);
        }
    }
    info!("Shutdown complete");
    Ok(())
}
