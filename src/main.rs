// Entry point for the ledger node binary
use clap::Parser;
use ledger_node::core::state::genesis_block;
use ledger_node::network::{Miner, PeerRegistry, ReconnectPolicy, Server, SyncProtocol};
use ledger_node::{BlockchainError, ChainState, Command, Config, Opt};
use log::{error, info, LevelFilter};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    // Info by default; RUST_LOG still overrides it
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::StartNode {
            config,
            miner,
            peers,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(address) = miner {
                config.mining_address = Some(address);
            }
            config.peers.extend(peers);
            config.validate()?;

            let addr = config.node_addr.clone();
            let dial = config.peers.clone();
            let mining_address = config.mining_address.clone();
            let policy = ReconnectPolicy {
                max_attempts: config.max_reconnect_attempts,
                base_delay: Duration::from_millis(config.reconnect_delay_ms),
            };

            let state = ChainState::new(config)?.into_shared();
            let protocol = SyncProtocol::new(state, Arc::new(PeerRegistry::new()));

            if let Some(address) = mining_address {
                let miner = Miner::new(protocol.clone(), &address);
                let stop = Arc::new(AtomicBool::new(false));
                thread::spawn(move || {
                    if let Err(e) = miner.run(stop) {
                        error!("Miner failed: {e}");
                    }
                });
            }

            info!("Starting node on {addr}");
            Server::new(protocol, policy).run(&addr, &dial)?;
        }
        Command::Genesis { config } => {
            let config = Config::load(config.as_deref())?;
            let genesis = genesis_block(&config);
            println!("{}", serde_json::to_string_pretty(&genesis)?);
        }
        Command::PrintChain { config } => {
            let config = Config::load(Some(config.as_path()))?;
            if config.data_dir.is_none() {
                return Err(BlockchainError::Config(
                    "print-chain needs data_dir to be configured".to_string(),
                )
                .into());
            }
            let state = ChainState::new(config)?;
            for block in state.blocks() {
                println!("{}", serde_json::to_string_pretty(block)?);
            }
        }
    }
    Ok(())
}
