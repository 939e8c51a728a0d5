//! Peer-to-peer networking
//!
//! This module handles communication between ledger nodes: the handshake
//! and reconciliation protocol, flood propagation of blocks and
//! transactions, the TCP transport, and the in-process miner.

pub mod message;
pub mod miner;
pub mod peer;
pub mod server;
pub mod sync;

pub use message::Package;
pub use miner::Miner;
pub use peer::{Peer, PeerDescriptor, PeerRegistry, PeerState};
pub use server::{ReconnectPolicy, Server, SessionEnd};
pub use sync::{PeerSession, Reply, SyncProtocol};
