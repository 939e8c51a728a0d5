//! Ledger integration tests
//!
//! Drives whole nodes through their public operations and through the peer
//! protocol, covering the end-to-end behavior two nodes must agree on.

mod common;

use common::{extend, genesis, mine, node, node_config, transfer, Link, ALICE, BOB, FAUCET};
use ledger_node::core::block::compute_block_hash;
use ledger_node::core::{read_state, write_state, TransactionStatus};
use ledger_node::network::{PeerRegistry, ReconnectPolicy, Server, SyncProtocol};
use ledger_node::{BlockchainError, ChainState, ErrorCategory, Package, ProofOfWork};
use num_bigint::BigUint;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

#[test]
fn test_lighter_node_pulls_pending_pool_on_reconciliation() {
    let a = node("a", 5001);
    let b = node("b", 5002);
    let tx = transfer(FAUCET, BOB, "40", "1", 100);
    {
        let mut state = write_state(a.get_state()).unwrap();
        state.admit_transaction(tx.clone()).unwrap();
        state.drain_events();
    }

    let mut link = Link::connect(&b, &a);
    link.pump();

    let state = read_state(b.get_state()).unwrap();
    assert_eq!(state.pending(), &[tx.clone()]);
    assert_eq!(
        state.find_transaction(tx.get_hash()).unwrap().status,
        TransactionStatus::Pending
    );
}

#[test]
fn test_mining_on_genesis_at_difficulty_one() {
    let mut state = ChainState::new(node_config("a", 5011)).unwrap();
    let block = mine(&mut state, ALICE);

    assert_eq!(block.get_difficulty(), 1);
    assert!(block.get_hash().starts_with('0'));
    assert_eq!(state.chain_len(), 2);
    assert_eq!(state.cumulative_difficulty(), &BigUint::from(17u32));
}

#[test]
fn test_fork_choice_by_cumulative_work() {
    let genesis = genesis();
    let mut heavier = vec![genesis.clone()];
    // 3 * 16^2 = 768, plus the genesis block's 1
    heavier.extend(extend(&genesis, &[2, 2, 2], BOB));

    // 1 + 31 * 16 = 497
    let mut light = ChainState::new(node_config("light", 5021)).unwrap();
    let mut own = vec![genesis.clone()];
    own.extend(extend(&genesis, &[1; 31], ALICE));
    for block in &own[1..] {
        light.append_block(block.clone()).unwrap();
    }
    assert_eq!(light.cumulative_difficulty(), &BigUint::from(497u32));
    light.replace_chain(&heavier).unwrap();
    assert_eq!(light.tip(), heavier.last().unwrap());
    assert_eq!(light.cumulative_difficulty(), &BigUint::from(769u32));

    // 1 + 4 * 16^2 = 1025
    let mut heavy = ChainState::new(node_config("heavy", 5022)).unwrap();
    for block in extend(&genesis, &[2, 2, 2, 2], ALICE) {
        heavy.append_block(block).unwrap();
    }
    let before = heavy.blocks().to_vec();
    let err = heavy.replace_chain(&heavier).unwrap_err();
    assert!(matches!(err, BlockchainError::InsufficientWork { .. }));
    assert_eq!(err.category(), ErrorCategory::Consensus);
    assert_eq!(heavy.blocks(), before.as_slice());
}

#[test]
fn test_malformed_sender_is_rejected_and_pool_unchanged() {
    let mut state = ChainState::new(node_config("a", 5031)).unwrap();
    state
        .admit_transaction(transfer(FAUCET, BOB, "1", "1", 1))
        .unwrap();
    let before = state.pending().to_vec();

    let err = state
        .admit_transaction(transfer("zz-not-hex", BOB, "1", "1", 2))
        .unwrap_err();
    assert!(matches!(err, BlockchainError::InvalidAddress(_)));
    assert_eq!(err.category(), ErrorCategory::Input);
    assert_eq!(state.pending(), before.as_slice());
}

#[test]
fn test_stored_hashes_replay_exactly() {
    let mut state = ChainState::new(node_config("a", 5041)).unwrap();
    state
        .admit_transaction(transfer(FAUCET, BOB, "12.5", "0.25", 7))
        .unwrap();
    mine(&mut state, ALICE);
    mine(&mut state, BOB);

    for block in state.blocks() {
        assert_eq!(block.compute_block_data_hash(), block.get_block_data_hash());
        assert_eq!(
            compute_block_hash(block.get_block_data_hash(), block.get_nonce()),
            block.get_hash()
        );
        for tx in block.get_transactions() {
            assert_eq!(tx.compute_hash(), tx.get_hash());
        }
    }
}

#[test]
fn test_invalid_chain_from_peer_leaves_state_untouched() {
    let a = node("a", 5051);
    let b = node("b", 5052);
    mine(&mut write_state(b.get_state()).unwrap(), ALICE);
    write_state(b.get_state()).unwrap().drain_events();

    let mut link = Link::connect(&a, &b);
    link.pump();
    let before = read_state(b.get_state()).unwrap().blocks().to_vec();

    // Heavier but block 2 misses its target
    let genesis = genesis();
    let mut forged = vec![genesis.clone()];
    forged.extend(extend(&genesis, &[2, 2, 2], BOB));
    let data_hash = forged[2].get_block_data_hash().to_string();
    let bad_nonce = (0u64..)
        .find(|n| !ProofOfWork::meets_target(&compute_block_hash(&data_hash, *n), 2))
        .unwrap();
    forged[2] = forged[2].clone().with_nonce(bad_nonce);

    link.inject_to_listener(Package::Chain { blocks: forged });
    link.pump();
    assert_eq!(read_state(b.get_state()).unwrap().blocks(), before.as_slice());
    // The sender is dropped, and told so
    assert!(b.get_peers().is_empty());
}

#[test]
fn test_blocks_propagate_between_synchronized_nodes() {
    let a = node("a", 5061);
    let b = node("b", 5062);
    for _ in 0..2 {
        mine(&mut write_state(a.get_state()).unwrap(), ALICE);
    }
    write_state(a.get_state()).unwrap().drain_events();

    // B is lighter: it pulls A's chain during reconciliation
    let mut link = Link::connect(&b, &a);
    link.pump();
    assert_eq!(read_state(b.get_state()).unwrap().chain_len(), 3);

    // New blocks on either side reach the other through relay
    mine(&mut write_state(a.get_state()).unwrap(), ALICE);
    a.relay_events().unwrap();
    link.pump();
    mine(&mut write_state(b.get_state()).unwrap(), BOB);
    b.relay_events().unwrap();
    link.pump();

    let a_state = read_state(a.get_state()).unwrap();
    let b_state = read_state(b.get_state()).unwrap();
    assert_eq!(a_state.chain_len(), 5);
    assert_eq!(a_state.blocks(), b_state.blocks());
    assert_eq!(a_state.balance(ALICE), b_state.balance(ALICE));
}

#[test]
fn test_transactions_propagate_and_confirm_on_both_nodes() {
    let a = node("a", 5071);
    let b = node("b", 5072);
    let mut link = Link::connect(&a, &b);
    link.pump();

    let tx = transfer(FAUCET, ALICE, "250", "2", 9);
    write_state(a.get_state())
        .unwrap()
        .admit_transaction(tx.clone())
        .unwrap();
    a.relay_events().unwrap();
    link.pump();
    assert_eq!(read_state(b.get_state()).unwrap().pending(), &[tx.clone()]);

    mine(&mut write_state(b.get_state()).unwrap(), BOB);
    b.relay_events().unwrap();
    link.pump();

    for side in [&a, &b] {
        let state = read_state(side.get_state()).unwrap();
        assert!(state.pending().is_empty());
        assert_eq!(
            state.find_transaction(tx.get_hash()).unwrap().status,
            TransactionStatus::Confirmed { block_index: 1 }
        );
        assert_eq!(
            state.balance(ALICE).confirmed_balance,
            ledger_node::Amount::from_integer(250)
        );
    }
}

#[test]
fn test_chain_persists_across_restart() {
    let dir = tempdir().unwrap();
    let mut config = node_config("a", 5081);
    config.data_dir = Some(dir.path().to_path_buf());

    let blocks = {
        let mut state = ChainState::new(config.clone()).unwrap();
        mine(&mut state, ALICE);
        let genesis = state.genesis().clone();
        // A heavier fork replaces the stored chain as a whole
        let mut fork = vec![genesis.clone()];
        fork.extend(extend(&genesis, &[2, 2], BOB));
        state.replace_chain(&fork).unwrap();
        state.blocks().to_vec()
    };

    let reopened = ChainState::new(config).unwrap();
    assert_eq!(reopened.blocks(), blocks.as_slice());
    assert_eq!(reopened.cumulative_difficulty(), &BigUint::from(513u32));
}

#[test]
fn test_nodes_sync_over_tcp() {
    let listen_port = 38_471;
    let a = node("tcp-a", listen_port);
    let b = node("tcp-b", listen_port + 1);
    let tx = transfer(FAUCET, BOB, "5", "1", 77);
    write_state(a.get_state())
        .unwrap()
        .admit_transaction(tx.clone())
        .unwrap();
    write_state(a.get_state()).unwrap().drain_events();

    let policy = ReconnectPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(100),
    };
    let server = Server::new(a.clone(), policy);
    thread::spawn(move || server.run(&format!("127.0.0.1:{listen_port}"), &[]));

    let dialer = Server::new(b.clone(), policy);
    dialer.spawn_dialer(format!("127.0.0.1:{listen_port}"));

    let deadline = Instant::now() + Duration::from_secs(10);
    while read_state(b.get_state()).unwrap().pending().is_empty() {
        assert!(Instant::now() < deadline, "pending pool never synchronized");
        thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(read_state(b.get_state()).unwrap().pending(), &[tx]);
}

#[test]
fn test_duplicate_peer_rejected_by_url() {
    let a = node("a", 5091);
    let b = node("b", 5092);
    let mut first = Link::connect(&b, &a);
    first.pump();

    // A second protocol instance claiming B's URL
    let imposter = SyncProtocol::new(
        ChainState::new(node_config("b2", 5092)).unwrap().into_shared(),
        Arc::new(PeerRegistry::new()),
    );
    let (tx, _rx) = std::sync::mpsc::channel();
    let (mut session, _) = a.open_session(tx, false).unwrap();
    let reply = a
        .handle(
            &mut session,
            Package::Hello {
                peer: imposter.descriptor().unwrap(),
            },
        )
        .unwrap();
    assert!(reply.disconnect);
    assert_eq!(a.get_peers().len(), 1);
}
