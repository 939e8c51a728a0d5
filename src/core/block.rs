use crate::core::Transaction;
use crate::utils::sha256_hex;
use serde::{Deserialize, Serialize};

/// Fixed creation time of the genesis block (2018-01-01T00:00:00Z)
pub const GENESIS_DATE: i64 = 1_514_764_800_000;
/// Sentinel parent hash of the genesis block
pub const GENESIS_PREV_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    index: u64,
    transactions: Vec<Transaction>,
    difficulty: u32,
    prev_block_hash: String,
    mined_by: String,
    block_data_hash: String,
    nonce: u64,
    date_created: i64,
    block_hash: String,
}

// The proof-of-work puzzle input. Nonce and timestamp are not part of it.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockDataHashInput<'a> {
    index: u64,
    prev_block_hash: &'a str,
    difficulty: u32,
    transactions: &'a [Transaction],
    mined_by: &'a str,
}

impl Block {
    /// An unsolved block: data hash stamped, nonce and block hash still empty
    pub fn new_candidate(
        index: u64,
        prev_block_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
        mined_by: &str,
        date_created: i64,
    ) -> Block {
        let mut block = Block {
            index,
            transactions,
            difficulty,
            prev_block_hash: prev_block_hash.to_string(),
            mined_by: mined_by.to_string(),
            block_data_hash: String::new(),
            nonce: 0,
            date_created,
            block_hash: String::new(),
        };
        block.block_data_hash = block.compute_block_data_hash();
        block
    }

    /// Attach a nonce and the block hash it produces
    pub fn with_nonce(mut self, nonce: u64) -> Block {
        self.nonce = nonce;
        self.block_hash = compute_block_hash(&self.block_data_hash, nonce);
        self
    }

    pub fn compute_block_data_hash(&self) -> String {
        let input = BlockDataHashInput {
            index: self.index,
            prev_block_hash: &self.prev_block_hash,
            difficulty: self.difficulty,
            transactions: &self.transactions,
            mined_by: &self.mined_by,
        };
        // Transactions hold only strings, integers and decimal amounts
        let json = serde_json::to_vec(&input).unwrap_or_default();
        sha256_hex(&json)
    }

    /// Genesis: index 0, parent "0", difficulty 0, at most one faucet credit
    pub fn build_genesis_block(genesis_transaction: Option<Transaction>) -> Block {
        let transactions = genesis_transaction.into_iter().collect();
        Block::new_candidate(
            0,
            GENESIS_PREV_HASH,
            transactions,
            0,
            crate::core::transaction::ZERO_ADDRESS,
            GENESIS_DATE,
        )
        .with_nonce(0)
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_prev_block_hash(&self) -> &str {
        self.prev_block_hash.as_str()
    }

    pub fn get_mined_by(&self) -> &str {
        self.mined_by.as_str()
    }

    pub fn get_block_data_hash(&self) -> &str {
        self.block_data_hash.as_str()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_date_created(&self) -> i64 {
        self.date_created
    }

    pub fn get_hash(&self) -> &str {
        self.block_hash.as_str()
    }
}

/// SHA-256 over the data hash followed by the decimal nonce
pub fn compute_block_hash(block_data_hash: &str, nonce: u64) -> String {
    sha256_hex(format!("{block_data_hash}{nonce}").as_bytes())
}
