//! Shared helpers for the integration tests
#![allow(dead_code)]

use ledger_node::core::state::genesis_block;
use ledger_node::network::{PeerRegistry, PeerSession, SyncProtocol};
use ledger_node::{Amount, Block, ChainState, Config, Package, ProofOfWork, Transaction};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

pub const ALICE: &str = "a1ce000000000000000000000000000000000001";
pub const BOB: &str = "b0b0000000000000000000000000000000000002";
pub const FAUCET: &str = "fa0cee0000000000000000000000000000000003";

const PUB_KEY: &str = "c74a8458cd7a7e48f4b7ae6f4ae9f56c5c88c0f03e7c59cb4e3d23dee8f1c7431";
const SIGNATURE_PART: &str = "1aaf55dcb11060749b391d547f37b4727222dcb753d32fc4ad0b4fa7ba4b642f";

/// Difficulty 1 that never retargets, faucet credited 1_000_000
pub fn node_config(id: &str, port: u16) -> Config {
    Config {
        node_addr: format!("127.0.0.1:{port}"),
        node_id: Some(id.to_string()),
        initial_difficulty: 1,
        block_time_low_secs: 0,
        block_time_high_secs: 3_600,
        faucet_address: FAUCET.to_string(),
        faucet_amount: Amount::from_integer(1_000_000),
        ..Config::default()
    }
}

pub fn node(id: &str, port: u16) -> SyncProtocol {
    let state = ChainState::new(node_config(id, port)).unwrap().into_shared();
    SyncProtocol::new(state, Arc::new(PeerRegistry::new()))
}

pub fn genesis() -> Block {
    genesis_block(&node_config("any", 1))
}

pub fn transfer(from: &str, to: &str, value: &str, fee: &str, date: i64) -> Transaction {
    Transaction::new(
        from,
        to,
        Amount::parse(value).unwrap(),
        Amount::parse(fee).unwrap(),
        vec![],
        PUB_KEY,
        [SIGNATURE_PART.to_string(), SIGNATURE_PART.to_string()],
        date,
    )
}

/// Mine the next block through the job interface
pub fn mine(state: &mut ChainState, miner: &str) -> Block {
    let job = state.create_job(miner).unwrap();
    let (nonce, _) = ProofOfWork::new(&job.block_data_hash, job.difficulty).run();
    state.submit_solution(&job.block_data_hash, nonce).unwrap()
}

/// Solve a chain on top of `parent`, one block per entry of `difficulties`
pub fn extend(parent: &Block, difficulties: &[u32], miner: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut tip = parent.clone();
    for &difficulty in difficulties {
        let candidate = Block::new_candidate(
            tip.get_index() + 1,
            tip.get_hash(),
            vec![],
            difficulty,
            miner,
            tip.get_date_created() + 1_000,
        );
        let (nonce, _) = ProofOfWork::new(candidate.get_block_data_hash(), difficulty).run();
        tip = candidate.with_nonce(nonce);
        blocks.push(tip.clone());
    }
    blocks
}

/// An in-memory duplex connection between two nodes
pub struct Link {
    pub dialer: SyncProtocol,
    pub listener: SyncProtocol,
    dialer_session: PeerSession,
    listener_session: PeerSession,
    dialer_tx: Sender<Package>,
    listener_tx: Sender<Package>,
    // What each side has queued for the other
    from_dialer: Receiver<Package>,
    from_listener: Receiver<Package>,
}

impl Link {
    pub fn connect(dialer: &SyncProtocol, listener: &SyncProtocol) -> Link {
        let (dialer_tx, from_dialer) = mpsc::channel();
        let (listener_tx, from_listener) = mpsc::channel();
        let (dialer_session, greeting) = dialer.open_session(dialer_tx.clone(), true).unwrap();
        let (listener_session, _) = listener.open_session(listener_tx.clone(), false).unwrap();
        for pkg in greeting {
            dialer_tx.send(pkg).unwrap();
        }
        Link {
            dialer: dialer.clone(),
            listener: listener.clone(),
            dialer_session,
            listener_session,
            dialer_tx,
            listener_tx,
            from_dialer,
            from_listener,
        }
    }

    /// Deliver packages both ways until neither side has anything queued
    pub fn pump(&mut self) -> usize {
        let mut total = 0;
        loop {
            let mut delivered = 0;
            while let Ok(pkg) = self.from_dialer.try_recv() {
                let reply = self
                    .listener
                    .handle(&mut self.listener_session, pkg)
                    .unwrap();
                for pkg in reply.packages {
                    self.listener_tx.send(pkg).unwrap();
                }
                self.listener.relay_events().unwrap();
                delivered += 1;
            }
            while let Ok(pkg) = self.from_listener.try_recv() {
                let reply = self.dialer.handle(&mut self.dialer_session, pkg).unwrap();
                for pkg in reply.packages {
                    self.dialer_tx.send(pkg).unwrap();
                }
                self.dialer.relay_events().unwrap();
                delivered += 1;
            }
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
    }

    /// Hand `pkg` to the listener as if the dialer had sent it
    pub fn inject_to_listener(&mut self, pkg: Package) {
        self.dialer_tx.send(pkg).unwrap();
    }
}
