//! Error handling for the ledger node
//!
//! Every fallible core operation returns [`BlockchainError`]. The variants are
//! grouped by [`ErrorCategory`] so the layer in front of the core (HTTP routes,
//! peer handlers) can decide how to report them without matching on strings.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Coarse classification of an error, used by callers to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or duplicate input, rejected before touching state
    Input,
    /// Valid input that breaks a consensus rule
    Consensus,
    /// Peer or socket trouble
    Transport,
    /// Storage, configuration and other node-local failures
    Internal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockchainError {
    /// Sender/recipient/miner address is not a 40 char hex identifier
    InvalidAddress(String),
    /// Public key is not 64 hex chars followed by a parity digit
    InvalidPublicKey(String),
    /// Signature is not a pair of 64 char hex strings
    InvalidSignature(String),
    /// Malformed transaction or block hash
    InvalidHash(String),
    /// Unparseable or negative decimal amount
    InvalidAmount(String),
    /// A transaction with the same hash is already pending or confirmed
    DuplicateTransaction(String),
    /// Any other structural problem with a transaction
    InvalidTransaction(String),
    /// Structural block errors (bad index, recomputed hash mismatch, ...)
    InvalidBlock(String),
    /// `prevBlockHash` does not point at the current tip
    BrokenLinkage { expected: String, found: String },
    /// The block hash does not satisfy the difficulty target
    ProofOfWorkNotMet { hash: String, difficulty: u32 },
    /// No candidate is registered under this block data hash
    UnknownJob(String),
    /// A proposed chain does not carry strictly more cumulative work
    InsufficientWork { local: String, candidate: String },
    /// Handshake refused by either side
    Handshake(String),
    /// Network communication errors
    Network(String),
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
    /// Lock poisoning and other broken internal invariants
    Internal(String),
}

impl BlockchainError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BlockchainError::InvalidAddress(_)
            | BlockchainError::InvalidPublicKey(_)
            | BlockchainError::InvalidSignature(_)
            | BlockchainError::InvalidHash(_)
            | BlockchainError::InvalidAmount(_)
            | BlockchainError::DuplicateTransaction(_)
            | BlockchainError::InvalidTransaction(_) => ErrorCategory::Input,
            BlockchainError::InvalidBlock(_)
            | BlockchainError::BrokenLinkage { .. }
            | BlockchainError::ProofOfWorkNotMet { .. }
            | BlockchainError::UnknownJob(_)
            | BlockchainError::InsufficientWork { .. } => ErrorCategory::Consensus,
            BlockchainError::Handshake(_) | BlockchainError::Network(_) => {
                ErrorCategory::Transport
            }
            BlockchainError::Database(_)
            | BlockchainError::Serialization(_)
            | BlockchainError::Config(_)
            | BlockchainError::Io(_)
            | BlockchainError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InvalidPublicKey(key) => write!(f, "Invalid public key: {key}"),
            BlockchainError::InvalidSignature(msg) => write!(f, "Invalid signature: {msg}"),
            BlockchainError::InvalidHash(hash) => write!(f, "Invalid hash: {hash}"),
            BlockchainError::InvalidAmount(msg) => write!(f, "Invalid amount: {msg}"),
            BlockchainError::DuplicateTransaction(hash) => {
                write!(f, "Duplicate transaction: {hash}")
            }
            BlockchainError::InvalidTransaction(msg) => write!(f, "Invalid transaction: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::BrokenLinkage { expected, found } => write!(
                f,
                "Block does not extend the tip: expected prev hash {expected}, found {found}"
            ),
            BlockchainError::ProofOfWorkNotMet { hash, difficulty } => write!(
                f,
                "Proof-of-work not met: {hash} does not satisfy difficulty {difficulty}"
            ),
            BlockchainError::UnknownJob(hash) => write!(f, "Unknown mining job: {hash}"),
            BlockchainError::InsufficientWork { local, candidate } => write!(
                f,
                "Insufficient cumulative work: local {local}, candidate {candidate}"
            ),
            BlockchainError::Handshake(msg) => write!(f, "Handshake rejected: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
