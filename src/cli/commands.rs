use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ledger-node")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "start-node", about = "Start a ledger node")]
    StartNode {
        #[arg(long, help = "Path to a TOML configuration file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Mine in-process, paying rewards to this address")]
        miner: Option<String>,
        #[arg(long = "peer", help = "Peer address to dial (repeatable)")]
        peers: Vec<String>,
    },
    #[command(name = "genesis", about = "Print the genesis block as JSON")]
    Genesis {
        #[arg(long, help = "Path to a TOML configuration file")]
        config: Option<PathBuf>,
    },
    #[command(name = "print-chain", about = "Print every stored block")]
    PrintChain {
        #[arg(long, help = "Path to a TOML configuration file")]
        config: PathBuf,
    },
}
