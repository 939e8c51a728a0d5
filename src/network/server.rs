use crate::error::{BlockchainError, Result};
use crate::network::{Package, SyncProtocol};
use log::{debug, error, info, warn};
use rand::Rng;
use serde_json::Deserializer;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

const TCP_CONNECT_TIMEOUT: u64 = 5000;
const TCP_WRITE_TIMEOUT: u64 = 5000;
const MAX_BACKOFF_SHIFT: u32 = 6;

/// How a finished session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Socket closed or failed after a successful handshake
    Closed,
    /// Either side refused the handshake; redialling is pointless
    Rejected,
    /// The peer asked us to hang up
    Dismissed,
}

/// Bounded retry policy for outbound connections
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    /// Exponential backoff with up to 10% jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        let delay = self.base_delay * factor;
        let jitter = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 10);
        delay + Duration::from_millis(jitter)
    }
}

/// TCP transport: one reader thread and one writer thread per peer
pub struct Server {
    protocol: SyncProtocol,
    policy: ReconnectPolicy,
}

impl Server {
    pub fn new(protocol: SyncProtocol, policy: ReconnectPolicy) -> Self {
        Self { protocol, policy }
    }

    /// Listen on `addr`, dial `peers`, and serve connections until the
    /// listener fails
    pub fn run(&self, addr: &str, peers: &[String]) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        info!("Server listening on {addr}");

        for peer in peers {
            self.spawn_dialer(peer.clone());
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };
                    let protocol = self.protocol.clone();
                    thread::spawn(move || {
                        if let Err(e) = Self::run_session(&protocol, stream, false) {
                            warn!("Connection from {peer_addr} ended: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        Ok(())
    }

    /// Keep a connection to `addr` up in the background
    pub fn spawn_dialer(&self, addr: String) -> thread::JoinHandle<()> {
        let protocol = self.protocol.clone();
        let policy = self.policy;
        thread::spawn(move || Self::dial_with_retry(&protocol, &addr, policy))
    }

    /// Dial `addr` and run sessions back to back. Consecutive failures are
    /// capped by `policy`; a session that got through the handshake resets
    /// the count. A rejected handshake or a dismissal ends the dialler.
    pub fn dial_with_retry(protocol: &SyncProtocol, addr: &str, policy: ReconnectPolicy) {
        let mut failures = 0;
        loop {
            match Self::connect(protocol, addr) {
                Ok(SessionEnd::Rejected) => {
                    warn!("Handshake with {addr} rejected, not redialling");
                    return;
                }
                Ok(SessionEnd::Dismissed) => {
                    info!("Peer {addr} ended the connection, not redialling");
                    return;
                }
                Ok(SessionEnd::Closed) => {
                    info!("Connection to {addr} closed, reconnecting");
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Connection attempt {failures}/{} to {addr} failed: {e}",
                        policy.max_attempts
                    );
                }
            }
            if failures >= policy.max_attempts {
                error!("Giving up on {addr} after {failures} failed attempts");
                return;
            }
            thread::sleep(policy.delay_for(failures.max(1)));
        }
    }

    /// Open one outbound session and run it to completion
    pub fn connect(protocol: &SyncProtocol, addr: &str) -> Result<SessionEnd> {
        let socket_addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?;
        let stream =
            TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_CONNECT_TIMEOUT))
                .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
        info!("Connected to {addr}");
        Self::run_session(protocol, stream, true)
    }

    fn run_session(protocol: &SyncProtocol, stream: TcpStream, outbound: bool) -> Result<SessionEnd> {
        stream
            .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
        let _ = stream.set_nodelay(true);

        let (sender, receiver) = mpsc::channel::<Package>();
        let write_half = stream
            .try_clone()
            .map_err(|e| BlockchainError::Network(format!("Failed to clone stream: {e}")))?;
        let writer = thread::spawn(move || Self::write_loop(write_half, receiver));

        let (mut session, greeting) = protocol.open_session(sender.clone(), outbound)?;
        for pkg in greeting {
            let _ = sender.send(pkg);
        }

        let mut handshaken = false;
        let mut rejected = false;
        let reader = BufReader::new(&stream);
        for pkg in Deserializer::from_reader(reader).into_iter::<Package>() {
            let pkg = match pkg {
                Ok(pkg) => pkg,
                Err(e) => {
                    debug!("Stream ended: {e}");
                    break;
                }
            };
            match protocol.handle(&mut session, pkg) {
                Ok(reply) => {
                    handshaken |= session.get_peer().is_some();
                    for pkg in reply.packages {
                        let _ = sender.send(pkg);
                    }
                    if let Err(e) = protocol.relay_events() {
                        error!("Failed to relay events: {e}");
                    }
                    if reply.disconnect {
                        rejected = !handshaken;
                        break;
                    }
                }
                Err(e) => {
                    rejected = matches!(e, BlockchainError::Handshake(_));
                    warn!("Dropping session: {e}");
                    break;
                }
            }
        }

        let dismissed = session.is_dismissed();
        protocol.close_session(&mut session);
        drop(session);
        drop(sender);
        // The writer drains what is queued, then the socket goes down
        let _ = writer.join();
        let _ = stream.shutdown(Shutdown::Both);

        if dismissed {
            Ok(SessionEnd::Dismissed)
        } else if handshaken {
            Ok(SessionEnd::Closed)
        } else if rejected {
            Ok(SessionEnd::Rejected)
        } else {
            Err(BlockchainError::Network(
                "Connection closed before handshake".to_string(),
            ))
        }
    }

    fn write_loop(mut stream: TcpStream, receiver: Receiver<Package>) {
        for pkg in receiver {
            debug!("Sending {}", pkg.kind());
            let written = serde_json::to_writer(&stream, &pkg)
                .map_err(BlockchainError::from)
                .and_then(|_| stream.flush().map_err(BlockchainError::from));
            if let Err(e) = written {
                warn!("Failed to write to peer: {e}");
                break;
            }
        }
        let _ = stream.shutdown(Shutdown::Write);
    }
}
