//! Mining candidate registry
//!
//! Holds the unsolved block templates handed out to miners, keyed by their
//! block data hash. A miner only ever sees the puzzle ([`MiningJob`]); the
//! template itself stays here so none of its fields can be altered
//! client-side.

use crate::core::{Amount, Block};
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a miner receives: enough to search for a nonce, nothing to forge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningJob {
    pub index: u64,
    pub transactions_included: usize,
    pub difficulty: u32,
    pub expected_reward: Amount,
    pub reward_address: String,
    pub block_data_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateRegistry {
    candidates: HashMap<String, Block>,
}

impl CandidateRegistry {
    pub fn new() -> CandidateRegistry {
        CandidateRegistry {
            candidates: HashMap::new(),
        }
    }

    /// Register `candidate` and describe it as a job
    pub fn register(&mut self, candidate: Block) -> MiningJob {
        let expected_reward = candidate
            .get_transactions()
            .first()
            .filter(|tx| tx.is_mint())
            .map(|tx| tx.get_value().clone())
            .unwrap_or_default();
        let job = MiningJob {
            index: candidate.get_index(),
            transactions_included: candidate.get_transactions().len(),
            difficulty: candidate.get_difficulty(),
            expected_reward,
            reward_address: candidate.get_mined_by().to_string(),
            block_data_hash: candidate.get_block_data_hash().to_string(),
        };
        self.candidates
            .insert(job.block_data_hash.clone(), candidate);
        job
    }

    /// The solved block for `block_data_hash`, if that job is still open
    pub fn solve(&self, block_data_hash: &str, nonce: u64) -> Result<Block> {
        let candidate = self
            .candidates
            .get(block_data_hash)
            .ok_or_else(|| BlockchainError::UnknownJob(block_data_hash.to_string()))?;
        Ok(candidate.clone().with_nonce(nonce))
    }

    pub fn get(&self, block_data_hash: &str) -> Option<&Block> {
        self.candidates.get(block_data_hash)
    }

    /// Every accepted block invalidates all outstanding jobs
    pub fn clear(&mut self) {
        self.candidates.clear();
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
