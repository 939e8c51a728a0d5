//! Node state aggregate
//!
//! One [`ChainState`] per node owns the chain, the pending pool, the
//! difficulty controller, the open mining jobs and the derived balances.
//! Every mutation goes through `&mut self`, so callers holding the
//! [`SharedState`] write lock get the single-writer discipline for free.
//!
//! Successful mutations queue a [`ChainEvent`]; the peer layer drains the
//! queue after releasing the lock and relays the events.

use crate::config::Config;
use crate::core::block::GENESIS_DATE;
use crate::core::blockchain::cumulative_work;
use crate::core::mining::{CandidateRegistry, MiningJob};
use crate::core::transaction::is_valid_address;
use crate::core::{
    AddressBalance, Amount, BalanceBook, Block, Blockchain, DifficultyController, ProofOfWork,
    Transaction,
};
use crate::error::{BlockchainError, Result};
use crate::storage::{BlockStore, PendingPool};
use crate::utils::current_timestamp;
use log::{debug, info, warn};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

const ABOUT: &str = concat!("ledger-node/", env!("CARGO_PKG_VERSION"));

pub type SharedState = Arc<RwLock<ChainState>>;

/// Outbound notifications produced by successful mutations
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent {
    NewBlock(Block),
    NewTransaction(Transaction),
}

/// Read-only node snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub about: String,
    pub node_id: String,
    pub node_url: String,
    pub chain_id: String,
    pub peers: usize,
    pub current_difficulty: u32,
    pub blocks_count: usize,
    pub cumulative_difficulty: String,
    pub confirmed_transactions: usize,
    pub pending_transactions: usize,
    pub tip_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum TransactionStatus {
    Pending,
    Confirmed { block_index: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction: Transaction,
    #[serde(flatten)]
    pub status: TransactionStatus,
}

pub struct ChainState {
    config: Config,
    node_id: String,
    node_url: String,
    chain: Blockchain,
    pool: PendingPool,
    difficulty: DifficultyController,
    candidates: CandidateRegistry,
    balances: BalanceBook,
    store: Option<BlockStore>,
    events: VecDeque<ChainEvent>,
}

/// The genesis every node configured with this faucet derives
pub fn genesis_block(config: &Config) -> Block {
    let faucet = Transaction::new_mint(
        &config.faucet_address,
        config.faucet_amount.clone(),
        GENESIS_DATE,
    );
    Block::build_genesis_block(Some(faucet))
}

/// A coinbase may pay at most the block reward plus the fees it collects
fn check_coinbase(block: &Block, block_reward: &Amount) -> Result<()> {
    let Some(coinbase) = block.get_transactions().first().filter(|tx| tx.is_mint()) else {
        return Ok(());
    };
    let fees: Amount = block.get_transactions()[1..]
        .iter()
        .map(|tx| tx.get_fee())
        .sum();
    let allowed = block_reward + &fees;
    if coinbase.get_value() > &allowed {
        return Err(BlockchainError::InvalidBlock(format!(
            "Block {} coinbase pays {}, at most {allowed} allowed",
            block.get_index(),
            coinbase.get_value()
        )));
    }
    Ok(())
}

impl ChainState {
    /// Build the node state, loading (or seeding) the block store when
    /// `data_dir` is configured
    pub fn new(config: Config) -> Result<ChainState> {
        let genesis = genesis_block(&config);
        let store = match &config.data_dir {
            Some(dir) => Some(BlockStore::open(
                &dir.join(format!("node_{}", config.port_suffix())),
            )?),
            None => None,
        };

        let chain = match &store {
            Some(store) => {
                let stored = store.load()?;
                if stored.is_empty() {
                    info!("Seeding block store with genesis {}", genesis.get_hash());
                    store.append(&genesis)?;
                    Blockchain::new(genesis)
                } else {
                    info!("Loaded {} blocks from the block store", stored.len());
                    Blockchain::from_blocks(&stored, &genesis)?
                }
            }
            None => Blockchain::new(genesis),
        };

        let node_id = config
            .node_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let node_url = config.node_addr.clone();
        let difficulty = DifficultyController::replay(config.difficulty(), chain.blocks());
        let balances = BalanceBook::from_chain(chain.blocks(), config.safe_confirmations);

        Ok(ChainState {
            config,
            node_id,
            node_url,
            chain,
            pool: PendingPool::new(),
            difficulty,
            candidates: CandidateRegistry::new(),
            balances,
            store,
            events: VecDeque::new(),
        })
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Extend the tip with `block`
    pub fn append_block(&mut self, block: Block) -> Result<()> {
        self.chain.validate_next(&block)?;
        check_coinbase(&block, &self.config.block_reward)?;
        if let Some(store) = &self.store {
            store.append(&block)?;
        }

        let previous_timestamp = self.chain.tip().get_date_created();
        self.difficulty.on_block_accepted(
            block.get_index(),
            block.get_date_created(),
            previous_timestamp,
        );
        self.chain.push(block.clone());
        self.candidates.clear();
        let confirmed = self.pool.prune_confirmed(block.get_transactions());
        self.refresh_balances();

        info!(
            "Accepted block {} ({}) mined by {}, {} pending transactions confirmed",
            block.get_index(),
            block.get_hash(),
            block.get_mined_by(),
            confirmed
        );
        self.events.push_back(ChainEvent::NewBlock(block));
        Ok(())
    }

    /// Adopt `blocks` if it is a valid chain from our genesis with strictly
    /// more cumulative work. On any error nothing changes.
    pub fn replace_chain(&mut self, blocks: &[Block]) -> Result<()> {
        // Bounded per block, so the sum stays small before full validation
        let candidate_work = cumulative_work(blocks)?;
        if candidate_work <= *self.chain.cumulative_difficulty() {
            return Err(BlockchainError::InsufficientWork {
                local: self.chain.cumulative_difficulty().to_string(),
                candidate: candidate_work.to_string(),
            });
        }

        let candidate = Blockchain::from_blocks(blocks, self.chain.genesis())?;
        for block in &candidate.blocks()[1..] {
            check_coinbase(block, &self.config.block_reward)?;
        }
        if let Some(store) = &self.store {
            store.replace_all(candidate.blocks())?;
        }

        let previous = std::mem::replace(&mut self.chain, candidate);
        self.difficulty =
            DifficultyController::replay(self.config.difficulty(), self.chain.blocks());
        self.candidates.clear();

        // Transfers that only lived on the discarded branch go back to the pool
        let orphans: Vec<Transaction> = previous.blocks()[1..]
            .iter()
            .flat_map(|b| b.get_transactions().iter())
            .filter(|tx| !tx.is_mint() && !self.chain.is_confirmed(tx.get_hash()))
            .cloned()
            .collect();
        let mut restored = 0;
        for tx in orphans {
            if self.pool.admit(tx).is_ok() {
                restored += 1;
            }
        }
        let confirmed: Vec<Transaction> = self
            .pool
            .get_all()
            .iter()
            .filter(|tx| self.chain.is_confirmed(tx.get_hash()))
            .cloned()
            .collect();
        self.pool.prune_confirmed(&confirmed);
        self.refresh_balances();

        info!(
            "Adopted chain of {} blocks with cumulative difficulty {} (was {} blocks, {}); {restored} orphaned transactions restored",
            self.chain.len(),
            self.chain.cumulative_difficulty(),
            previous.len(),
            previous.cumulative_difficulty()
        );
        self.events
            .push_back(ChainEvent::NewBlock(self.chain.tip().clone()));
        Ok(())
    }

    /// Admit a transaction into the pending pool
    pub fn admit_transaction(&mut self, tx: Transaction) -> Result<()> {
        if self.chain.is_confirmed(tx.get_hash()) {
            return Err(BlockchainError::DuplicateTransaction(
                tx.get_hash().to_string(),
            ));
        }
        self.pool.admit(tx.clone())?;
        self.events.push_back(ChainEvent::NewTransaction(tx));
        Ok(())
    }

    /// Pending pool first, then confirmed blocks newest first
    pub fn find_transaction(&self, hash: &str) -> Option<TransactionRecord> {
        if let Some(tx) = self.pool.get(hash) {
            return Some(TransactionRecord {
                transaction: tx.clone(),
                status: TransactionStatus::Pending,
            });
        }
        self.chain
            .find_transaction(hash)
            .map(|(block_index, tx)| TransactionRecord {
                transaction: tx.clone(),
                status: TransactionStatus::Confirmed { block_index },
            })
    }

    pub fn get_info(&self, peers: usize) -> ChainInfo {
        ChainInfo {
            about: ABOUT.to_string(),
            node_id: self.node_id.clone(),
            node_url: self.node_url.clone(),
            chain_id: self.chain.genesis().get_hash().to_string(),
            peers,
            current_difficulty: self.difficulty.current_difficulty(),
            blocks_count: self.chain.len(),
            cumulative_difficulty: self.chain.cumulative_difficulty().to_string(),
            confirmed_transactions: self.chain.confirmed_count(),
            pending_transactions: self.pool.len(),
            tip_hash: self.chain.tip().get_hash().to_string(),
        }
    }

    /// Snapshot the tip and the best pending transactions into a new job
    pub fn create_job(&mut self, miner_address: &str) -> Result<MiningJob> {
        if !is_valid_address(miner_address) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid miner address: {miner_address}"
            )));
        }

        let index = self.chain.tip().get_index() + 1;
        // Never date a block before its parent, whatever the local clock says
        let date_created = current_timestamp()?.max(self.chain.tip().get_date_created());
        // Only transfers the senders can still cover go into the template
        let dropped = self.pool.prune_insufficient_funds(&self.balances);
        if dropped > 0 {
            debug!("Pruned {dropped} unaffordable pending transactions before issuing a job");
        }
        // The coinbase takes one slot of the block capacity
        let transfers = self
            .pool
            .top(self.config.max_transactions_per_block.saturating_sub(1));
        let fees: Amount = transfers.iter().map(|tx| tx.get_fee()).sum();
        let coinbase = Transaction::new_coinbase(
            miner_address,
            &self.config.block_reward + &fees,
            index,
            date_created,
        );

        let mut transactions = Vec::with_capacity(transfers.len() + 1);
        transactions.push(coinbase);
        transactions.extend(transfers);

        let candidate = Block::new_candidate(
            index,
            self.chain.tip().get_hash(),
            transactions,
            self.difficulty.current_difficulty(),
            miner_address,
            date_created,
        );
        let job = self.candidates.register(candidate);
        debug!(
            "Issued job {} for block {index} at difficulty {} to {miner_address}",
            job.block_data_hash, job.difficulty
        );
        Ok(job)
    }

    /// Turn a nonce for an open job into an appended block
    pub fn submit_solution(&mut self, block_data_hash: &str, nonce: u64) -> Result<Block> {
        let block = self.candidates.solve(block_data_hash, nonce)?;
        if !ProofOfWork::meets_target(block.get_hash(), block.get_difficulty()) {
            warn!(
                "Rejected solution for job {block_data_hash}: hash {} misses difficulty {}",
                block.get_hash(),
                block.get_difficulty()
            );
            return Err(BlockchainError::ProofOfWorkNotMet {
                hash: block.get_hash().to_string(),
                difficulty: block.get_difficulty(),
            });
        }
        self.append_block(block.clone())?;
        Ok(block)
    }

    fn refresh_balances(&mut self) {
        self.balances = BalanceBook::from_chain(self.chain.blocks(), self.config.safe_confirmations);
        let dropped = self.pool.prune_insufficient_funds(&self.balances);
        if dropped > 0 {
            debug!("Pruned {dropped} unaffordable pending transactions");
        }
    }

    /// Take every queued event, oldest first
    pub fn drain_events(&mut self) -> Vec<ChainEvent> {
        self.events.drain(..).collect()
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn blocks(&self) -> &[Block] {
        self.chain.blocks()
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        self.chain.get_block(index)
    }

    pub fn tip(&self) -> &Block {
        self.chain.tip()
    }

    pub fn genesis(&self) -> &Block {
        self.chain.genesis()
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn cumulative_difficulty(&self) -> &BigUint {
        self.chain.cumulative_difficulty()
    }

    pub fn current_difficulty(&self) -> u32 {
        self.difficulty.current_difficulty()
    }

    pub fn difficulty(&self) -> &DifficultyController {
        &self.difficulty
    }

    pub fn pending(&self) -> &[Transaction] {
        self.pool.get_all()
    }

    pub fn confirmed_transactions(&self) -> Vec<Transaction> {
        self.chain.confirmed_transactions()
    }

    pub fn balance(&self, address: &str) -> AddressBalance {
        self.balances.balance(address)
    }

    pub fn balances(&self) -> Vec<(String, AddressBalance)> {
        self.balances.non_zero()
    }

    pub fn open_jobs(&self) -> usize {
        self.candidates.len()
    }

    /// False once a competing block has cleared the job
    pub fn is_job_open(&self, block_data_hash: &str) -> bool {
        self.candidates.get(block_data_hash).is_some()
    }
}

/// Take the read lock, mapping poisoning to an internal error
pub fn read_state(state: &SharedState) -> Result<RwLockReadGuard<'_, ChainState>> {
    state
        .read()
        .map_err(|e| BlockchainError::Internal(format!("State lock poisoned: {e}")))
}

/// Take the write lock, mapping poisoning to an internal error
pub fn write_state(state: &SharedState) -> Result<RwLockWriteGuard<'_, ChainState>> {
    state
        .write()
        .map_err(|e| BlockchainError::Internal(format!("State lock poisoned: {e}")))
}
