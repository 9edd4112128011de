//! Utility functions shared across the auction crate.

use crate::error::{AuctionError, AuctionResult};
use serde::de::DeserializeOwned;

/// Deserialize JSON data with a size limit to reject oversized payloads.
pub fn json_from_limited<T: DeserializeOwned>(data: &[u8], max_bytes: usize) -> AuctionResult<T> {
    if data.len() > max_bytes {
        return Err(AuctionError::Serialization(format!(
            "JSON payload too large: {} bytes (max {})",
            data.len(),
            max_bytes
        )));
    }
    serde_json::from_slice(data)
        .map_err(|e| AuctionError::Serialization(format!("JSON deserialization failed: {e}")))
}

/// Serialize a value to JSON bytes.
pub fn json_to_vec<T: serde::Serialize>(value: &T) -> AuctionResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| AuctionError::Serialization(format!("JSON serialization failed: {e}")))
}

/// First eight hex characters of an identifier, for log lines.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
