use crate::core::block::compute_block_hash;
use crate::core::Block;
use crate::error::{BlockchainError, Result};
use log::debug;
use num_bigint::BigInt;
use std::ops::ShlAssign;

/// Each difficulty step demands one more leading zero nibble
const BITS_PER_DIFFICULTY: u32 = 4;
const HASH_BITS: u32 = 256;
const HASH_HEX_LEN: usize = 64;

pub struct ProofOfWork {
    block_data_hash: String,
    target: BigInt,
    difficulty: u32,
}

impl ProofOfWork {
    pub fn new(block_data_hash: &str, difficulty: u32) -> ProofOfWork {
        ProofOfWork {
            block_data_hash: block_data_hash.to_string(),
            target: Self::target_for(difficulty),
            difficulty,
        }
    }

    /// `2^(256 - 4*difficulty)`: a hash below it has `difficulty` zero nibbles
    pub fn target_for(difficulty: u32) -> BigInt {
        let shift = HASH_BITS.saturating_sub(difficulty.saturating_mul(BITS_PER_DIFFICULTY));
        let mut target = BigInt::from(1);
        target.shl_assign(shift);
        target
    }

    pub fn meets_target(block_hash: &str, difficulty: u32) -> bool {
        if block_hash.len() != HASH_HEX_LEN {
            return false;
        }
        match BigInt::parse_bytes(block_hash.as_bytes(), 16) {
            Some(hash_int) => hash_int < Self::target_for(difficulty),
            None => false,
        }
    }

    /// Recompute both hashes from the block content and check the target
    pub fn validate(block: &Block) -> Result<()> {
        let data_hash = block.compute_block_data_hash();
        if data_hash != block.get_block_data_hash() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} data hash mismatch: stored {}, computed {data_hash}",
                block.get_index(),
                block.get_block_data_hash()
            )));
        }
        let block_hash = compute_block_hash(&data_hash, block.get_nonce());
        if block_hash != block.get_hash() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} hash mismatch: stored {}, computed {block_hash}",
                block.get_index(),
                block.get_hash()
            )));
        }
        if !Self::meets_target(&block_hash, block.get_difficulty()) {
            return Err(BlockchainError::ProofOfWorkNotMet {
                hash: block_hash,
                difficulty: block.get_difficulty(),
            });
        }
        Ok(())
    }

    fn try_nonce(&self, nonce: u64) -> Option<String> {
        let hash = compute_block_hash(&self.block_data_hash, nonce);
        let hash_int = BigInt::parse_bytes(hash.as_bytes(), 16)?;
        if hash_int < self.target {
            Some(hash)
        } else {
            None
        }
    }

    /// Search `attempts` nonces starting at `start_nonce`
    pub fn run_bounded(&self, start_nonce: u64, attempts: u64) -> Option<(u64, String)> {
        let mut nonce = start_nonce;
        for _ in 0..attempts {
            if let Some(hash) = self.try_nonce(nonce) {
                debug!(
                    "Found nonce {nonce} for {} at difficulty {}",
                    self.block_data_hash, self.difficulty
                );
                return Some((nonce, hash));
            }
            nonce = nonce.wrapping_add(1);
        }
        None
    }

    /// Search until a nonce is found
    pub fn run(&self) -> (u64, String) {
        let mut start = 0u64;
        loop {
            if let Some(found) = self.run_bounded(start, u32::MAX as u64) {
                return found;
            }
            start = start.wrapping_add(u32::MAX as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::ALICE;

    fn mined_block(difficulty: u32) -> Block {
        let candidate = Block::new_candidate(1, "prev", vec![], difficulty, ALICE, 1);
        let (nonce, _) = ProofOfWork::new(candidate.get_block_data_hash(), difficulty).run();
        candidate.with_nonce(nonce)
    }

    #[test]
    fn test_target_shrinks_with_difficulty() {
        assert!(ProofOfWork::target_for(2) < ProofOfWork::target_for(1));
        assert_eq!(
            ProofOfWork::target_for(1) * BigInt::from(16),
            ProofOfWork::target_for(0)
        );
    }

    #[test]
    fn test_leading_zero_nibbles() {
        let two_zeros = format!("00{}", "f".repeat(62));
        assert!(ProofOfWork::meets_target(&two_zeros, 2));
        assert!(!ProofOfWork::meets_target(&two_zeros, 3));
        assert!(ProofOfWork::meets_target(&"f".repeat(64), 0));
        assert!(!ProofOfWork::meets_target("00", 1));
    }

    #[test]
    fn test_mined_block_validates() {
        let block = mined_block(2);
        assert!(block.get_hash().starts_with("00"));
        assert!(ProofOfWork::validate(&block).is_ok());
    }

    #[test]
    fn test_wrong_nonce_fails_target() {
        let block = mined_block(2);
        // Find a nonce that does not satisfy the target
        let mut bad = block.get_nonce().wrapping_add(1);
        while ProofOfWork::meets_target(&compute_block_hash(block.get_block_data_hash(), bad), 2) {
            bad = bad.wrapping_add(1);
        }
        let forged = block.with_nonce(bad);
        assert!(matches!(
            ProofOfWork::validate(&forged),
            Err(BlockchainError::ProofOfWorkNotMet { difficulty: 2, .. })
        ));
    }

    #[test]
    fn test_tampered_content_is_detected() {
        let block = mined_block(1);
        let mut json = serde_json::to_value(&block).unwrap();
        json["minedBy"] = serde_json::Value::String("1".repeat(40));
        let tampered: Block = serde_json::from_value(json).unwrap();
        assert!(matches!(
            ProofOfWork::validate(&tampered),
            Err(BlockchainError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_run_bounded_gives_up() {
        let pow = ProofOfWork::new("data", 64);
        assert!(pow.run_bounded(0, 10).is_none());
    }
}
