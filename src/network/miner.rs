use crate::core::{read_state, write_state, Block, MiningJob, ProofOfWork};
use crate::error::{BlockchainError, Result};
use crate::network::SyncProtocol;
use log::{info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Nonces tried between checks that the job is still open
const NONCE_BATCH: u64 = 50_000;
/// Batches searched before a fresh job picks up newer pending transactions
const BATCHES_PER_JOB: u32 = 20;

/// Mines on behalf of `address`, taking the state lock only to fetch a job
/// and to submit a solution
pub struct Miner {
    protocol: SyncProtocol,
    address: String,
}

impl Miner {
    pub fn new(protocol: SyncProtocol, address: &str) -> Miner {
        Miner {
            protocol,
            address: address.to_string(),
        }
    }

    /// Mine until `stop` is set
    pub fn run(&self, stop: Arc<AtomicBool>) -> Result<()> {
        info!("Miner started for {}", self.address);
        while !stop.load(Ordering::Relaxed) {
            match self.mine_block(&stop) {
                Ok(Some(block)) => info!(
                    "Mined block {} ({}) at difficulty {}",
                    block.get_index(),
                    block.get_hash(),
                    block.get_difficulty()
                ),
                Ok(None) => {}
                Err(e @ BlockchainError::Internal(_)) => return Err(e),
                Err(e) => warn!("Mining round failed: {e}"),
            }
        }
        info!("Miner stopped");
        Ok(())
    }

    /// One job: `Ok(None)` if it went stale or `stop` was set first
    pub fn mine_block(&self, stop: &AtomicBool) -> Result<Option<Block>> {
        let job = self.next_job()?;
        let pow = ProofOfWork::new(&job.block_data_hash, job.difficulty);
        let mut nonce: u64 = rand::thread_rng().gen();

        for _ in 0..BATCHES_PER_JOB {
            if stop.load(Ordering::Relaxed) {
                return Ok(None);
            }
            if let Some((found, _)) = pow.run_bounded(nonce, NONCE_BATCH) {
                let block = write_state(self.protocol.get_state())?
                    .submit_solution(&job.block_data_hash, found)?;
                self.protocol.relay_events()?;
                return Ok(Some(block));
            }
            nonce = nonce.wrapping_add(NONCE_BATCH);
            if !read_state(self.protocol.get_state())?.is_job_open(&job.block_data_hash) {
                return Ok(None);
            }
        }
        Ok(None)
    }

    fn next_job(&self) -> Result<MiningJob> {
        write_state(self.protocol.get_state())?.create_job(&self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChainState;
    use crate::network::PeerRegistry;
    use crate::testnet::{test_config, ALICE};

    #[test]
    fn test_mine_block_extends_chain() {
        let state = ChainState::new(test_config()).unwrap().into_shared();
        let miner = Miner::new(SyncProtocol::new(state.clone(), Arc::new(PeerRegistry::new())), ALICE);
        let stop = AtomicBool::new(false);

        let mut mined = None;
        while mined.is_none() {
            mined = miner.mine_block(&stop).unwrap();
        }
        let state = read_state(&state).unwrap();
        assert_eq!(state.chain_len(), 2);
        assert_eq!(state.tip().get_mined_by(), ALICE);
    }

    #[test]
    fn test_stop_flag_halts_search() {
        let state = ChainState::new(test_config()).unwrap().into_shared();
        let miner = Miner::new(SyncProtocol::new(state.clone(), Arc::new(PeerRegistry::new())), ALICE);
        let stop = Arc::new(AtomicBool::new(true));
        miner.run(stop).unwrap();
        assert_eq!(read_state(&state).unwrap().chain_len(), 1);
    }
}
