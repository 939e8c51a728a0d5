// This is the canonical chain: an ordered run of blocks starting at genesis,
// plus the cumulative work that fork choice compares. It only knows the
// structural rules (linkage, proof-of-work, transaction shape). Pool,
// difficulty and balances are coordinated one level up in `ChainState`.

use crate::core::{Block, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use std::collections::HashSet;

const MIN_BLOCK_DIFFICULTY: u32 = 1;
// A hash has 64 hex digits, no target beyond that can be met
pub const MAX_BLOCK_DIFFICULTY: u32 = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Blockchain {
    blocks: Vec<Block>,
    cumulative_difficulty: BigUint,
    // Hashes of every confirmed transaction, for duplicate checks
    confirmed: HashSet<String>,
}

/// Work contributed by one block: `16^difficulty`
pub fn block_work(difficulty: u32) -> BigUint {
    BigUint::from(16u32).pow(difficulty)
}

/// Sum of `16^difficulty` over `blocks`, refusing any block whose
/// difficulty no hash can meet
pub fn cumulative_work(blocks: &[Block]) -> Result<BigUint> {
    let mut total = BigUint::zero();
    for block in blocks {
        check_difficulty_ceiling(block)?;
        total += block_work(block.get_difficulty());
    }
    Ok(total)
}

fn check_difficulty_ceiling(block: &Block) -> Result<()> {
    if block.get_difficulty() > MAX_BLOCK_DIFFICULTY {
        return Err(BlockchainError::InvalidBlock(format!(
            "Block {} difficulty {} is above the maximum of {MAX_BLOCK_DIFFICULTY}",
            block.get_index(),
            block.get_difficulty()
        )));
    }
    Ok(())
}

impl Blockchain {
    pub fn new(genesis: Block) -> Blockchain {
        let mut chain = Blockchain {
            blocks: Vec::new(),
            cumulative_difficulty: BigUint::zero(),
            confirmed: HashSet::new(),
        };
        chain.push(genesis);
        chain
    }

    /// Validate a complete chain from genesis and build it.
    ///
    /// `genesis` is the block every chain on this network must start with.
    /// Nothing is built unless every block passes.
    pub fn from_blocks(blocks: &[Block], genesis: &Block) -> Result<Blockchain> {
        let first = blocks
            .first()
            .ok_or_else(|| BlockchainError::InvalidBlock("Chain is empty".to_string()))?;
        if first != genesis {
            return Err(BlockchainError::InvalidBlock(format!(
                "Genesis mismatch: expected {}, found {}",
                genesis.get_hash(),
                first.get_hash()
            )));
        }

        let mut chain = Blockchain::new(first.clone());
        for block in &blocks[1..] {
            chain.validate_next(block)?;
            chain.push(block.clone());
        }
        Ok(chain)
    }

    /// Everything `block` must satisfy to extend the current tip
    pub fn validate_next(&self, block: &Block) -> Result<()> {
        let tip = self.tip();

        // Linkage is checked before the (more expensive) proof-of-work
        if block.get_prev_block_hash() != tip.get_hash() {
            return Err(BlockchainError::BrokenLinkage {
                expected: tip.get_hash().to_string(),
                found: block.get_prev_block_hash().to_string(),
            });
        }
        if block.get_index() != tip.get_index() + 1 {
            return Err(BlockchainError::InvalidBlock(format!(
                "Expected index {}, found {}",
                tip.get_index() + 1,
                block.get_index()
            )));
        }
        if block.get_difficulty() < MIN_BLOCK_DIFFICULTY {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} difficulty {} is below the minimum of {MIN_BLOCK_DIFFICULTY}",
                block.get_index(),
                block.get_difficulty()
            )));
        }
        check_difficulty_ceiling(block)?;
        if block.get_date_created() < tip.get_date_created() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} is dated {}, before its parent at {}",
                block.get_index(),
                block.get_date_created(),
                tip.get_date_created()
            )));
        }

        ProofOfWork::validate(block)?;
        self.validate_transactions(block)
    }

    fn validate_transactions(&self, block: &Block) -> Result<()> {
        let mut seen = HashSet::new();
        for (position, tx) in block.get_transactions().iter().enumerate() {
            tx.validate_format()?;
            if tx.is_mint() && (position != 0 || tx.get_to() != block.get_mined_by()) {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {} has a mint transaction {} that is not its coinbase",
                    block.get_index(),
                    tx.get_hash()
                )));
            }
            if !seen.insert(tx.get_hash()) || self.confirmed.contains(tx.get_hash()) {
                return Err(BlockchainError::DuplicateTransaction(
                    tx.get_hash().to_string(),
                ));
            }
        }
        Ok(())
    }

    // Callers validate first
    pub(crate) fn push(&mut self, block: Block) {
        self.cumulative_difficulty += block_work(block.get_difficulty());
        for tx in block.get_transactions() {
            self.confirmed.insert(tx.get_hash().to_string());
        }
        self.blocks.push(block);
    }

    pub fn tip(&self) -> &Block {
        // A chain always holds at least its genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    pub fn get_block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn cumulative_difficulty(&self) -> &BigUint {
        &self.cumulative_difficulty
    }

    pub fn is_confirmed(&self, tx_hash: &str) -> bool {
        self.confirmed.contains(tx_hash)
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.len()
    }

    /// Confirmed transactions, oldest block first
    pub fn confirmed_transactions(&self) -> Vec<Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.get_transactions().iter().cloned())
            .collect()
    }

    /// Scan newest block first; returns the containing block index
    pub fn find_transaction(&self, hash: &str) -> Option<(u64, &Transaction)> {
        if !self.confirmed.contains(hash) {
            return None;
        }
        self.blocks.iter().rev().find_map(|block| {
            block
                .get_transactions()
                .iter()
                .find(|tx| tx.get_hash() == hash)
                .map(|tx| (block.get_index(), tx))
        })
    }
}
