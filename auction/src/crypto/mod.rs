//! Content addressing for auction identifiers.
//!
//! Topic ids are the SHA-256 of the auction title; record ids are the
//! SHA-256 of the serialized creation-time snapshot.

pub mod content;

pub use content::{hash, topic_id, Digest, DIGEST_LEN};
