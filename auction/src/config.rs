//! Configuration constants and node settings.
//!
//! This module centralizes magic numbers and configuration values
//! to improve maintainability and enable easier tuning.

use std::path::PathBuf;

use crate::error::{AuctionError, AuctionResult};

/// Maximum size of a single gossip message or RPC request body.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024;

/// Maximum size of a stored auction record.
pub const MAX_RECORD_SIZE: usize = 16 * 1024;

/// Maximum title length in bytes. Keeps every record well under
/// [`MAX_RECORD_SIZE`] together with [`MAX_BIDDER_LEN`].
pub const MAX_TITLE_LEN: usize = 1024;

/// Maximum bidder identity length in bytes.
pub const MAX_BIDDER_LEN: usize = 256;

/// Reserved store key holding this peer's identity seed.
pub const PEER_SEED_KEY: &str = "dht-seed";

/// Reserved store key holding the RPC responder seed.
pub const RPC_SEED_KEY: &str = "rpc-seed";

/// Keys that hold locally generated secrets rather than auction state.
pub const RESERVED_KEYS: [&str; 2] = [PEER_SEED_KEY, RPC_SEED_KEY];

/// Length in bytes of generated seeds.
pub const SEED_LEN: usize = 32;

/// Number of peers the devnet runner starts when nothing else is configured.
pub const DEFAULT_PEER_COUNT: usize = 2;

/// Upper bound on peers in one devnet process.
pub const MAX_PEER_COUNT: usize = 64;

/// File name of each peer's append-only store inside its data directory.
pub const STORE_FILE_NAME: &str = "auction.log";

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable for the devnet peer count.
pub const PEERS_ENV: &str = "AUCTION_PEERS";

/// Environment variable for the data directory root.
pub const DATA_DIR_ENV: &str = "AUCTION_DATA_DIR";

/// Settings for the devnet node runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Root directory; each peer gets `peer-<index>/` beneath it.
    pub data_dir: PathBuf,
    /// Number of peers to start on the shared overlay.
    pub peers: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("auction-node"),
            peers: DEFAULT_PEER_COUNT,
        }
    }
}

impl NodeConfig {
    /// Build a config from defaults overridden by environment variables.
    pub fn from_env() -> AuctionResult<Self> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(peers) = std::env::var(PEERS_ENV) {
            config.peers = parse_peer_count(&peers)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply `--peers N` and `--data-dir PATH` on top of an existing config.
    pub fn apply_args<I>(mut self, args: I) -> AuctionResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--peers" => {
                    let value = args.next().ok_or_else(|| {
                        AuctionError::InvalidArgument("--peers requires a value".into())
                    })?;
                    self.peers = parse_peer_count(&value)?;
                }
                "--data-dir" => {
                    let value = args.next().ok_or_else(|| {
                        AuctionError::InvalidArgument("--data-dir requires a value".into())
                    })?;
                    self.data_dir = PathBuf::from(value);
                }
                other => {
                    return Err(AuctionError::InvalidArgument(format!(
                        "Unknown argument: {other}"
                    )));
                }
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Path of the store file for the peer at `index`.
    pub fn peer_store_path(&self, index: usize) -> PathBuf {
        self.data_dir
            .join(format!("peer-{index}"))
            .join(STORE_FILE_NAME)
    }

    fn validate(&self) -> AuctionResult<()> {
        if self.peers == 0 || self.peers > MAX_PEER_COUNT {
            return Err(AuctionError::InvalidArgument(format!(
                "Peer count must be between 1 and {MAX_PEER_COUNT}, got {}",
                self.peers
            )));
        }
        Ok(())
    }
}

fn parse_peer_count(value: &str) -> AuctionResult<usize> {
    value
        .parse()
        .map_err(|e| AuctionError::InvalidArgument(format!("Invalid peer count '{value}': {e}")))
}
