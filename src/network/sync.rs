// Per-connection synchronization. Nothing in here touches sockets: a
// session is fed inbound packages and answers with packages for the same
// peer, while chain events are relayed to every registered peer through its
// channel. The TCP server and the tests both drive it the same way.

use crate::core::{read_state, write_state, Block, ChainEvent, SharedState};
use crate::error::{BlockchainError, Result};
use crate::network::{Package, Peer, PeerDescriptor, PeerRegistry, PeerState};
use log::{debug, info, warn};
use num_bigint::BigUint;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// One side of a peer connection
pub struct PeerSession {
    state: PeerState,
    outbound: bool,
    // The peer told us to go away
    dismissed: bool,
    peer: Option<PeerDescriptor>,
    sender: Sender<Package>,
}

impl PeerSession {
    pub fn get_state(&self) -> PeerState {
        self.state
    }

    pub fn get_peer(&self) -> Option<&PeerDescriptor> {
        self.peer.as_ref()
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed
    }

    fn peer_url(&self) -> &str {
        self.peer.as_ref().map(|p| p.node_url.as_str()).unwrap_or("?")
    }
}

/// Packages to send back on the session, and whether to hang up afterwards
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    pub packages: Vec<Package>,
    pub disconnect: bool,
}

impl Reply {
    fn none() -> Reply {
        Reply::default()
    }

    fn send(packages: Vec<Package>) -> Reply {
        Reply {
            packages,
            disconnect: false,
        }
    }

    fn reject(reason: String) -> Reply {
        Reply {
            packages: vec![Package::Rejected { reason }],
            disconnect: true,
        }
    }
}

#[derive(Clone)]
pub struct SyncProtocol {
    state: SharedState,
    peers: Arc<PeerRegistry>,
}

impl SyncProtocol {
    pub fn new(state: SharedState, peers: Arc<PeerRegistry>) -> SyncProtocol {
        SyncProtocol { state, peers }
    }

    pub fn get_state(&self) -> &SharedState {
        &self.state
    }

    pub fn get_peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    pub fn descriptor(&self) -> Result<PeerDescriptor> {
        let state = read_state(&self.state)?;
        Ok(PeerDescriptor {
            node_id: state.node_id().to_string(),
            node_url: state.node_url().to_string(),
            cumulative_difficulty: state.cumulative_difficulty().to_string(),
        })
    }

    /// Start a session; the dialling side opens with `Hello`
    pub fn open_session(
        &self,
        sender: Sender<Package>,
        outbound: bool,
    ) -> Result<(PeerSession, Vec<Package>)> {
        let mut session = PeerSession {
            state: PeerState::Connecting,
            outbound,
            dismissed: false,
            peer: None,
            sender,
        };
        let greeting = if outbound {
            vec![Package::Hello {
                peer: self.descriptor()?,
            }]
        } else {
            vec![]
        };
        session.state = PeerState::Handshaking;
        Ok((session, greeting))
    }

    /// Process one inbound package
    pub fn handle(&self, session: &mut PeerSession, pkg: Package) -> Result<Reply> {
        debug!("Received {} from {}", pkg.kind(), session.peer_url());
        match session.state {
            PeerState::Connecting | PeerState::Disconnected => Err(BlockchainError::Network(
                "Session is not open".to_string(),
            )),
            PeerState::Handshaking => self.handle_handshake(session, pkg),
            PeerState::Synchronized => self.handle_synchronized(session, pkg),
        }
    }

    fn handle_handshake(&self, session: &mut PeerSession, pkg: Package) -> Result<Reply> {
        match (pkg, session.outbound) {
            (Package::Hello { peer }, false) => {
                let work = match self.accept_peer(session, peer) {
                    Ok(work) => work,
                    Err(e) => return Ok(self.reject_handshake(session, e)),
                };
                let mut packages = vec![Package::Welcome {
                    peer: self.descriptor()?,
                }];
                packages.push(self.reconcile(&work)?);
                Ok(Reply::send(packages))
            }
            (Package::Welcome { peer }, true) => {
                let work = match self.accept_peer(session, peer) {
                    Ok(work) => work,
                    Err(e) => return Ok(self.reject_handshake(session, e)),
                };
                Ok(Reply::send(vec![self.reconcile(&work)?]))
            }
            (Package::Rejected { reason }, _) => {
                session.state = PeerState::Disconnected;
                Err(BlockchainError::Handshake(format!(
                    "Peer refused the handshake: {reason}"
                )))
            }
            (other, _) => Ok(self.reject_handshake(
                session,
                BlockchainError::Handshake(format!("Unexpected {} before handshake", other.kind())),
            )),
        }
    }

    fn reject_handshake(&self, session: &mut PeerSession, error: BlockchainError) -> Reply {
        warn!("Rejecting peer handshake: {error}");
        session.state = PeerState::Disconnected;
        Reply::reject(error.to_string())
    }

    /// Validate and register the remote descriptor
    fn accept_peer(&self, session: &mut PeerSession, peer: PeerDescriptor) -> Result<BigUint> {
        let work = peer.validate()?;
        let own = self.descriptor()?;
        if peer.node_id == own.node_id || peer.node_url == own.node_url {
            return Err(BlockchainError::Handshake(
                "Refusing to connect to ourselves".to_string(),
            ));
        }
        self.peers
            .register(Peer::new(peer.clone(), session.sender.clone()))?;

        info!(
            "Peer {} ({}) connected with cumulative difficulty {work}",
            peer.node_url, peer.node_id
        );
        session.peer = Some(peer);
        session.state = PeerState::Synchronized;
        Ok(work)
    }

    /// Pull the chain from a heavier peer, otherwise just its pending pool
    fn reconcile(&self, peer_work: &BigUint) -> Result<Package> {
        let state = read_state(&self.state)?;
        if peer_work > state.cumulative_difficulty() {
            info!(
                "Peer chainwork {peer_work} exceeds ours ({}), requesting chain",
                state.cumulative_difficulty()
            );
            Ok(Package::GetChain)
        } else {
            Ok(Package::GetPending)
        }
    }

    fn handle_synchronized(&self, session: &mut PeerSession, pkg: Package) -> Result<Reply> {
        match pkg {
            Package::GetChain => {
                let state = read_state(&self.state)?;
                Ok(Reply::send(vec![Package::Chain {
                    blocks: state.blocks().to_vec(),
                }]))
            }
            Package::Chain { blocks } => {
                let outcome = write_state(&self.state)?.replace_chain(&blocks);
                match outcome {
                    Ok(()) => info!(
                        "Adopted chain of {} blocks from {}",
                        blocks.len(),
                        session.peer_url()
                    ),
                    Err(e @ BlockchainError::InsufficientWork { .. }) => {
                        info!("Kept local chain over {}'s: {e}", session.peer_url())
                    }
                    Err(e) => {
                        warn!("Peer {} sent an invalid chain: {e}", session.peer_url());
                        let peer_url = session.peer_url().to_string();
                        self.disconnect_peer(&peer_url)?;
                        return Ok(Reply {
                            packages: vec![],
                            disconnect: true,
                        });
                    }
                }
                Ok(Reply::send(vec![Package::GetPending]))
            }
            Package::GetPending => {
                let state = read_state(&self.state)?;
                Ok(Reply::send(vec![Package::Pending {
                    transactions: state.pending().to_vec(),
                }]))
            }
            Package::Pending { transactions } => {
                let mut state = write_state(&self.state)?;
                let offered = transactions.len();
                let admitted = transactions
                    .into_iter()
                    .filter(|tx| state.admit_transaction(tx.clone()).is_ok())
                    .count();
                debug!(
                    "Merged {admitted} of {offered} pending transactions from {}",
                    session.peer_url()
                );
                Ok(Reply::none())
            }
            Package::NewTransaction { transaction } => {
                let mut state = write_state(&self.state)?;
                if let Err(e) = state.admit_transaction(transaction) {
                    debug!("Ignored transaction from {}: {e}", session.peer_url());
                }
                Ok(Reply::none())
            }
            Package::NewBlock { block } => self.handle_block(session, block),
            Package::NotifyBlock { node_url, block } => {
                if node_url != read_state(&self.state)?.node_url() {
                    debug!("Ignored block notification addressed to {node_url}");
                    return Ok(Reply::none());
                }
                self.handle_block(session, block)
            }
            Package::GetInfo => {
                let state = read_state(&self.state)?;
                Ok(Reply::send(vec![Package::Info {
                    info: state.get_info(self.peers.len()),
                }]))
            }
            Package::Info { info } => {
                debug!(
                    "Peer {} reports {} blocks, cumulative difficulty {}",
                    info.node_url, info.blocks_count, info.cumulative_difficulty
                );
                Ok(Reply::none())
            }
            // Only ever ends this connection; other peers' sessions are theirs
            Package::RemovePeer { node_url } if node_url == session.peer_url() => {
                info!("Peer {node_url} asked to end the connection");
                session.dismissed = true;
                Ok(Reply {
                    packages: vec![],
                    disconnect: true,
                })
            }
            Package::RemovePeer { node_url } => {
                debug!(
                    "Ignored removal of {node_url} requested by {}",
                    session.peer_url()
                );
                Ok(Reply::none())
            }
            other @ (Package::Hello { .. } | Package::Welcome { .. }) => {
                debug!("Ignored repeated {} from {}", other.kind(), session.peer_url());
                Ok(Reply::none())
            }
            Package::Rejected { reason } => {
                warn!("Peer {} rejected us: {reason}", session.peer_url());
                Ok(Reply {
                    packages: vec![],
                    disconnect: true,
                })
            }
        }
    }

    fn handle_block(&self, session: &PeerSession, block: Block) -> Result<Reply> {
        let mut state = write_state(&self.state)?;
        let tip_index = state.tip().get_index();
        let index = block.get_index();
        match state.append_block(block) {
            Ok(()) => Ok(Reply::none()),
            Err(e) if index > tip_index => {
                info!(
                    "Block {index} from {} does not extend our tip {tip_index} ({e}), requesting chain",
                    session.peer_url()
                );
                Ok(Reply::send(vec![Package::GetChain]))
            }
            Err(e) if index < tip_index => {
                debug!(
                    "Peer {} is behind (block {index} vs {tip_index}): {e}",
                    session.peer_url()
                );
                Ok(Reply::send(vec![Package::NotifyBlock {
                    node_url: session.peer_url().to_string(),
                    block: state.tip().clone(),
                }]))
            }
            Err(e) => {
                debug!("Ignored block {index} from {}: {e}", session.peer_url());
                Ok(Reply::none())
            }
        }
    }

    /// Tear the session down and forget the peer
    pub fn close_session(&self, session: &mut PeerSession) {
        if session.state == PeerState::Synchronized {
            if let Some(peer) = &session.peer {
                if let Err(e) = self.peers.remove(&peer.node_url) {
                    warn!("Failed to remove peer {}: {e}", peer.node_url);
                }
                info!("Peer {} disconnected", peer.node_url);
            }
        }
        session.state = PeerState::Disconnected;
    }

    /// Drain queued chain events and flood them to every registered peer
    pub fn relay_events(&self) -> Result<usize> {
        let events = write_state(&self.state)?.drain_events();
        if events.is_empty() {
            return Ok(0);
        }
        let peers = self.peers.get_peers()?;
        for event in &events {
            let pkg = match event {
                ChainEvent::NewBlock(block) => Package::NewBlock {
                    block: block.clone(),
                },
                ChainEvent::NewTransaction(transaction) => Package::NewTransaction {
                    transaction: transaction.clone(),
                },
            };
            for peer in &peers {
                if !peer.send(pkg.clone()) {
                    debug!("Peer {} went away before relay", peer.get_node_url());
                }
            }
        }
        Ok(events.len())
    }

    /// Ask the peer at `node_url` to hang up and stop tracking it
    pub fn disconnect_peer(&self, node_url: &str) -> Result<bool> {
        let own_url = read_state(&self.state)?.node_url().to_string();
        match self.peers.remove(node_url)? {
            Some(peer) => {
                info!("Disconnecting peer {node_url}");
                Ok(peer.send(Package::RemovePeer { node_url: own_url }))
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChainState;
    use crate::testnet::{mine_next, mine_on, sample_transaction, test_config, ALICE, BOB, FAUCET};
    use std::sync::mpsc::{self, Receiver};

    fn node(id: &str, port: u16) -> SyncProtocol {
        let mut config = test_config();
        config.node_id = Some(id.to_string());
        config.node_addr = format!("127.0.0.1:{port}");
        let state = ChainState::new(config).unwrap().into_shared();
        SyncProtocol::new(state, Arc::new(PeerRegistry::new()))
    }

    fn session(node: &SyncProtocol, outbound: bool) -> (PeerSession, Vec<Package>, Receiver<Package>) {
        let (tx, rx) = mpsc::channel();
        let (session, greeting) = node.open_session(tx, outbound).unwrap();
        (session, greeting, rx)
    }

    #[test]
    fn test_handshake_and_pending_reconciliation() {
        let a = node("a", 4001);
        let b = node("b", 4002);
        let (mut a_side, _, _a_rx) = session(&a, false);
        let (mut b_side, hello, _b_rx) = session(&b, true);

        let reply = a.handle(&mut a_side, hello[0].clone()).unwrap();
        assert_eq!(a_side.get_state(), PeerState::Synchronized);
        assert!(matches!(reply.packages[0], Package::Welcome { .. }));
        // Equal work: ask for pending rather than the chain
        assert_eq!(reply.packages[1], Package::GetPending);

        let reply = b.handle(&mut b_side, reply.packages[0].clone()).unwrap();
        assert_eq!(reply.packages, vec![Package::GetPending]);
        assert_eq!(a.get_peers().len(), 1);
        assert_eq!(b.get_peers().len(), 1);
    }

    #[test]
    fn test_rejects_self_and_duplicates() {
        let a = node("a", 4011);
        let (mut own, hello, _rx) = session(&a, true);
        own.outbound = false;
        let reply = a.handle(&mut own, hello[0].clone()).unwrap();
        assert!(reply.disconnect);
        assert!(matches!(reply.packages[0], Package::Rejected { .. }));

        let b = node("b", 4012);
        let (_, b_hello, _) = session(&b, true);
        let (mut first, _, _r1) = session(&a, false);
        let (mut second, _, _r2) = session(&a, false);
        assert!(!a.handle(&mut first, b_hello[0].clone()).unwrap().disconnect);
        let dup = a.handle(&mut second, b_hello[0].clone()).unwrap();
        assert!(dup.disconnect);
        assert_eq!(second.get_state(), PeerState::Disconnected);
        assert_eq!(a.get_peers().len(), 1);
    }

    #[test]
    fn test_rejects_malformed_descriptor() {
        let a = node("a", 4021);
        let (mut side, _, _rx) = session(&a, false);
        let bad = Package::Hello {
            peer: PeerDescriptor {
                node_id: "x".into(),
                node_url: "nowhere".into(),
                cumulative_difficulty: "1".into(),
            },
        };
        assert!(a.handle(&mut side, bad).unwrap().disconnect);
        assert!(a.get_peers().is_empty());
    }

    #[test]
    fn test_requires_handshake_first() {
        let a = node("a", 4031);
        let (mut side, _, _rx) = session(&a, false);
        let reply = a.handle(&mut side, Package::GetChain).unwrap();
        assert!(reply.disconnect);
    }

    #[test]
    fn test_heavier_peer_triggers_chain_request() {
        let a = node("a", 4041);
        let b = node("b", 4042);
        mine_next(&mut write_state(a.get_state()).unwrap(), ALICE).unwrap();

        let (mut b_side, _, _) = session(&b, false);
        let (_, a_hello, _) = session(&a, true);
        let reply = b.handle(&mut b_side, a_hello[0].clone()).unwrap();
        assert_eq!(reply.packages[1], Package::GetChain);
    }

    #[test]
    fn test_relay_floods_events_to_peers() {
        let a = node("a", 4051);
        let b = node("b", 4052);
        let (mut a_side, _, a_rx) = session(&a, false);
        let (_, hello, _) = session(&b, true);
        a.handle(&mut a_side, hello[0].clone()).unwrap();

        let tx = sample_transaction(FAUCET, ALICE, "3", "1", 11);
        write_state(a.get_state())
            .unwrap()
            .admit_transaction(tx.clone())
            .unwrap();
        assert_eq!(a.relay_events().unwrap(), 1);
        assert_eq!(
            a_rx.try_recv().unwrap(),
            Package::NewTransaction { transaction: tx }
        );
        assert_eq!(a.relay_events().unwrap(), 0);
    }

    #[test]
    fn test_close_session_forgets_peer() {
        let a = node("a", 4061);
        let b = node("b", 4062);
        let (mut a_side, _, _rx) = session(&a, false);
        let (_, hello, _) = session(&b, true);
        a.handle(&mut a_side, hello[0].clone()).unwrap();
        a.close_session(&mut a_side);
        assert!(a.get_peers().is_empty());
        assert_eq!(a_side.get_state(), PeerState::Disconnected);
    }

    #[test]
    fn test_remove_peer_only_ends_the_named_session() {
        let a = node("a", 4081);
        let b = node("b", 4082);
        let c = node("c", 4083);
        let (mut a_to_b, _, b_rx) = session(&a, false);
        let (mut a_to_c, _, _c_rx) = session(&a, false);
        let (_, b_hello, _) = session(&b, true);
        let (_, c_hello, _) = session(&c, true);
        a.handle(&mut a_to_b, b_hello[0].clone()).unwrap();
        a.handle(&mut a_to_c, c_hello[0].clone()).unwrap();

        // C cannot evict B
        let reply = a
            .handle(
                &mut a_to_c,
                Package::RemovePeer {
                    node_url: "127.0.0.1:4082".into(),
                },
            )
            .unwrap();
        assert_eq!(reply, Reply::default());
        assert_eq!(a.get_peers().len(), 2);

        let tx = sample_transaction(FAUCET, ALICE, "3", "1", 12);
        write_state(a.get_state())
            .unwrap()
            .admit_transaction(tx.clone())
            .unwrap();
        a.relay_events().unwrap();
        assert_eq!(
            b_rx.try_recv().unwrap(),
            Package::NewTransaction { transaction: tx }
        );

        // C asking for its own removal ends C's session
        let reply = a
            .handle(
                &mut a_to_c,
                Package::RemovePeer {
                    node_url: "127.0.0.1:4083".into(),
                },
            )
            .unwrap();
        assert!(reply.disconnect);
        assert!(a_to_c.is_dismissed());
        assert!(!a_to_b.is_dismissed());
    }

    #[test]
    fn test_invalid_chain_disconnects_sender() {
        let a = node("a", 4091);
        let b = node("b", 4092);
        let (mut a_side, _, a_rx) = session(&a, false);
        let (_, hello, _) = session(&b, true);
        a.handle(&mut a_side, hello[0].clone()).unwrap();

        let genesis = read_state(a.get_state()).unwrap().genesis().clone();
        let b1 = mine_on(&genesis, vec![], 2, BOB);
        // Heavier, but its last block hangs off a block the chain never had
        let sibling = mine_on(&b1, vec![], 2, ALICE);
        let stray = mine_on(&sibling, vec![], 2, BOB);

        let reply = a
            .handle(
                &mut a_side,
                Package::Chain {
                    blocks: vec![genesis, b1, stray],
                },
            )
            .unwrap();
        assert!(reply.disconnect);
        assert!(a.get_peers().is_empty());
        assert_eq!(
            a_rx.try_recv().unwrap(),
            Package::RemovePeer {
                node_url: "127.0.0.1:4091".into()
            }
        );
        assert_eq!(read_state(a.get_state()).unwrap().chain_len(), 1);
    }

    #[test]
    fn test_lighter_chain_is_kept_quietly() {
        let a = node("a", 4101);
        let b = node("b", 4102);
        let (mut a_side, _, _rx) = session(&a, false);
        let (_, hello, _) = session(&b, true);
        a.handle(&mut a_side, hello[0].clone()).unwrap();
        mine_next(&mut write_state(a.get_state()).unwrap(), ALICE).unwrap();

        let genesis = read_state(a.get_state()).unwrap().genesis().clone();
        let reply = a
            .handle(&mut a_side, Package::Chain { blocks: vec![genesis] })
            .unwrap();
        assert_eq!(reply.packages, vec![Package::GetPending]);
        assert!(!reply.disconnect);
        assert_eq!(a.get_peers().len(), 1);
    }

    #[test]
    fn test_stale_block_gets_our_tip_back() {
        let a = node("a", 4071);
        let b = node("b", 4072);
        let (mut a_side, _, _rx) = session(&a, false);
        let (_, hello, _) = session(&b, true);
        a.handle(&mut a_side, hello[0].clone()).unwrap();

        let genesis = read_state(a.get_state()).unwrap().genesis().clone();
        mine_next(&mut write_state(a.get_state()).unwrap(), ALICE).unwrap();
        mine_next(&mut write_state(a.get_state()).unwrap(), ALICE).unwrap();

        let reply = a
            .handle(&mut a_side, Package::NewBlock { block: genesis })
            .unwrap();
        match &reply.packages[0] {
            Package::NotifyBlock { node_url, block } => {
                assert_eq!(node_url, "127.0.0.1:4072");
                assert_eq!(block.get_index(), 2);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
