use crate::core::{Block, ChainInfo, Transaction};
use crate::network::PeerDescriptor;
use serde::{Deserialize, Serialize};

/// Everything exchanged on a peer connection.
///
/// Packages travel as a plain stream of concatenated JSON values, read back
/// with `serde_json::Deserializer::into_iter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Package {
    /// Dialling side introduces itself
    Hello { peer: PeerDescriptor },
    /// Listening side accepts and introduces itself
    Welcome { peer: PeerDescriptor },
    /// Either side refuses the handshake; the connection is torn down
    Rejected { reason: String },
    GetChain,
    Chain { blocks: Vec<Block> },
    GetPending,
    Pending { transactions: Vec<Transaction> },
    NewTransaction { transaction: Transaction },
    NewBlock { block: Block },
    /// A block pushed to one peer, addressed by its node URL
    NotifyBlock { node_url: String, block: Block },
    GetInfo,
    Info { info: ChainInfo },
    /// The sender is dropping the named peer
    RemovePeer { node_url: String },
}

impl Package {
    pub fn kind(&self) -> &'static str {
        match self {
            Package::Hello { .. } => "Hello",
            Package::Welcome { .. } => "Welcome",
            Package::Rejected { .. } => "Rejected",
            Package::GetChain => "GetChain",
            Package::Chain { .. } => "Chain",
            Package::GetPending => "GetPending",
            Package::Pending { .. } => "Pending",
            Package::NewTransaction { .. } => "NewTransaction",
            Package::NewBlock { .. } => "NewBlock",
            Package::NotifyBlock { .. } => "NotifyBlock",
            Package::GetInfo => "GetInfo",
            Package::Info { .. } => "Info",
            Package::RemovePeer { .. } => "RemovePeer",
        }
    }
}
