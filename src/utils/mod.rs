//! Utility functions and helpers
//!
//! Hashing, timestamps, hex checks and the bincode layer used by storage.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, is_hex_of_len, sha256_digest, sha256_hex};

pub use serialization::{deserialize, hex_bytes, serialize};
