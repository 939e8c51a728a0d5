//! Test utilities for ledger testing

use crate::config::Config;
use crate::core::state::genesis_block;
use crate::core::{Amount, Block, ChainState, ProofOfWork, Transaction};
use crate::error::Result;

pub const ALICE: &str = "a1ce000000000000000000000000000000000001";
pub const BOB: &str = "b0b0000000000000000000000000000000000002";
/// Credited 1_000_000 by [`test_genesis`]
pub const FAUCET: &str = "fa0cee0000000000000000000000000000000003";

pub const TEST_PUB_KEY: &str = "c74a8458cd7a7e48f4b7ae6f4ae9f56c5c88c0f03e7c59cb4e3d23dee8f1c7431";
pub const TEST_SIGNATURE_PART: &str =
    "1aaf55dcb11060749b391d547f37b4727222dcb753d32fc4ad0b4fa7ba4b642f";

/// Defaults tuned for fast tests: difficulty 1 that never retargets
pub fn test_config() -> Config {
    Config {
        node_id: Some("test-node".to_string()),
        initial_difficulty: 1,
        block_time_low_secs: 0,
        block_time_high_secs: 3_600,
        faucet_address: FAUCET.to_string(),
        faucet_amount: Amount::from_integer(1_000_000),
        ..Config::default()
    }
}

/// The genesis a [`test_config`] node derives
pub fn test_genesis() -> Block {
    genesis_block(&test_config())
}

/// A well-formed transfer; amounts are decimal strings
pub fn sample_transaction(from: &str, to: &str, value: &str, fee: &str, date: i64) -> Transaction {
    Transaction::new(
        from,
        to,
        Amount::parse(value).unwrap(),
        Amount::parse(fee).unwrap(),
        vec![],
        TEST_PUB_KEY,
        [
            TEST_SIGNATURE_PART.to_string(),
            TEST_SIGNATURE_PART.to_string(),
        ],
        date,
    )
}

/// Solve a block on top of `parent`, one second later
pub fn mine_on(parent: &Block, transactions: Vec<Transaction>, difficulty: u32, miner: &str) -> Block {
    mine_after(parent, transactions, difficulty, miner, 1_000)
}

/// Solve a block dated `interval_millis` after `parent`
pub fn mine_after(
    parent: &Block,
    transactions: Vec<Transaction>,
    difficulty: u32,
    miner: &str,
    interval_millis: i64,
) -> Block {
    let candidate = Block::new_candidate(
        parent.get_index() + 1,
        parent.get_hash(),
        transactions,
        difficulty,
        miner,
        parent.get_date_created() + interval_millis,
    );
    let (nonce, _) = ProofOfWork::new(candidate.get_block_data_hash(), difficulty).run();
    candidate.with_nonce(nonce)
}

/// Issue a job to `miner`, search it and submit the solution
pub fn mine_next(state: &mut ChainState, miner: &str) -> Result<Block> {
    let job = state.create_job(miner)?;
    let (nonce, _) = ProofOfWork::new(&job.block_data_hash, job.difficulty).run();
    state.submit_solution(&job.block_data_hash, nonce)
}
