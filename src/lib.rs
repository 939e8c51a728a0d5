//! # Ledger Node - a peer-to-peer proof-of-work ledger
//!
//! The consensus and synchronization engine of a small account-style ledger.
//! When coming back to this code, here's the map:
//!
//! ## What It Does
//! - **Consensus**: block/transaction validity rules and greatest-cumulative-work fork choice
//! - **Difficulty**: running-average retargeting between a low and a high block time
//! - **Pending Pool**: fee-ordered unconfirmed transactions with confirmation and funds pruning
//! - **Mining**: server-side block templates handed out as puzzles, solved by nonce
//! - **P2P Sync**: handshake, reconciliation and flood propagation over TCP
//! - **Persistence**: optional sled block store under the configured data directory
//!
//! ## How the Code Is Organized
//! - `core/`: amounts, blocks, transactions, proof-of-work, difficulty, chain, mining, node state
//! - `storage/`: pending pool, sled block store
//! - `network/`: wire packages, peers, sync protocol, TCP server, miner
//! - `config/`: TOML + environment configuration
//! - `utils/`: hashing, hex and bincode helpers
//! - `cli/`: command-line interface
//!
//! ## Where To Start Reading
//! 1. `core/state.rs` for every operation a node exposes
//! 2. `core/blockchain.rs` for the validity rules
//! 3. `network/sync.rs` for what peers say to each other

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    Amount, Block, Blockchain, ChainEvent, ChainInfo, ChainState, MiningJob, ProofOfWork,
    SharedState, Transaction,
};
pub use error::{BlockchainError, ErrorCategory, Result};
pub use network::{Package, PeerDescriptor, PeerRegistry, Server, SyncProtocol};
pub use storage::{BlockStore, PendingPool};
pub use utils::{current_timestamp, sha256_digest, sha256_hex};
