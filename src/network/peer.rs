use crate::error::{BlockchainError, Result};
use crate::network::Package;
use log::debug;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc::Sender;
use std::sync::RwLock;

/// What a node says about itself during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDescriptor {
    pub node_id: String,
    /// `host:port` the node listens on
    pub node_url: String,
    /// Decimal chainwork
    pub cumulative_difficulty: String,
}

impl PeerDescriptor {
    /// Reject malformed descriptors; returns the parsed chainwork
    pub fn validate(&self) -> Result<BigUint> {
        if self.node_id.trim().is_empty() {
            return Err(BlockchainError::Handshake("Empty node id".to_string()));
        }
        self.node_url.parse::<SocketAddr>().map_err(|e| {
            BlockchainError::Handshake(format!("Invalid node url {}: {e}", self.node_url))
        })?;
        self.cumulative_difficulty
            .parse::<BigUint>()
            .map_err(|e| {
                BlockchainError::Handshake(format!(
                    "Invalid cumulative difficulty {}: {e}",
                    self.cumulative_difficulty
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Handshaking,
    Synchronized,
    Disconnected,
}

/// A handshaken peer and the channel feeding its connection writer
#[derive(Debug, Clone)]
pub struct Peer {
    descriptor: PeerDescriptor,
    sender: Sender<Package>,
}

impl Peer {
    pub fn new(descriptor: PeerDescriptor, sender: Sender<Package>) -> Peer {
        Peer { descriptor, sender }
    }

    pub fn get_node_url(&self) -> &str {
        self.descriptor.node_url.as_str()
    }

    /// Queue `pkg` for this peer; false when its connection is gone
    pub fn send(&self, pkg: Package) -> bool {
        self.sender.send(pkg).is_ok()
    }
}

/// Connected peers keyed by node URL
#[derive(Debug, Default)]
pub struct PeerRegistry {
    inner: RwLock<HashMap<String, Peer>>,
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Add `peer` unless its node URL is already known
    pub fn register(&self, peer: Peer) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| BlockchainError::Internal(format!("Peer registry lock poisoned: {e}")))?;
        if inner.contains_key(peer.get_node_url()) {
            return Err(BlockchainError::Handshake(format!(
                "Peer {} is already connected",
                peer.get_node_url()
            )));
        }
        debug!("Registered peer {}", peer.get_node_url());
        inner.insert(peer.get_node_url().to_string(), peer);
        Ok(())
    }

    pub fn remove(&self, node_url: &str) -> Result<Option<Peer>> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| BlockchainError::Internal(format!("Peer registry lock poisoned: {e}")))?;
        Ok(inner.remove(node_url))
    }

    pub fn get_peers(&self) -> Result<Vec<Peer>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| BlockchainError::Internal(format!("Peer registry lock poisoned: {e}")))?;
        Ok(inner.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
