//! Core ledger functionality
//!
//! This module contains the consensus components: blocks and transactions,
//! proof-of-work, difficulty retargeting, the canonical chain with its fork
//! choice, mining jobs, and the [`ChainState`] aggregate tying them to the
//! pending pool.

pub mod amount;
pub mod balances;
pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod mining;
pub mod proof_of_work;
pub mod state;
pub mod transaction;

pub use amount::Amount;
pub use balances::{AddressBalance, BalanceBook};
pub use block::Block;
pub use blockchain::Blockchain;
pub use difficulty::{DifficultyConfig, DifficultyController};
pub use mining::{CandidateRegistry, MiningJob};
pub use proof_of_work::ProofOfWork;
pub use state::{
    read_state, write_state, ChainEvent, ChainInfo, ChainState, SharedState, TransactionRecord,
    TransactionStatus,
};
pub use transaction::Transaction;
