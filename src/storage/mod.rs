//! Data storage and persistence
//!
//! This module holds the pending transaction pool and the optional sled
//! block store that keeps the chain across restarts.

pub mod block_store;
pub mod memory_pool;

pub use block_store::BlockStore;
pub use memory_pool::{fee_priority, PendingPool};
