use crate::core::{Amount, DifficultyConfig};
use crate::error::{BlockchainError, Result};
use log::info;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";
const DEFAULT_FAUCET_ADDRESS: &str = "f3a1e69b6176052fcc4a3248f1c5a91dea308ca9";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";
const NODE_ID_KEY: &str = "NODE_ID";
const DATA_DIR_KEY: &str = "DATA_DIR";
const PEERS_KEY: &str = "PEERS";

/// Node settings; every key is optional in the TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address, also advertised to peers as our node URL
    pub node_addr: String,
    /// Generated when absent
    pub node_id: Option<String>,
    pub mining_address: Option<String>,
    /// Enables the sled block store
    pub data_dir: Option<PathBuf>,
    /// Peers dialled on startup
    pub peers: Vec<String>,
    pub initial_difficulty: u32,
    pub block_time_low_secs: u64,
    pub block_time_high_secs: u64,
    /// Includes the coinbase transaction
    pub max_transactions_per_block: usize,
    pub block_reward: Amount,
    pub faucet_address: String,
    pub faucet_amount: Amount,
    pub safe_confirmations: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_addr: String::from(DEFAULT_NODE_ADDR),
            node_id: None,
            mining_address: None,
            data_dir: None,
            peers: Vec::new(),
            initial_difficulty: DifficultyConfig::default().initial_difficulty,
            block_time_low_secs: DifficultyConfig::default().block_time_low_secs,
            block_time_high_secs: DifficultyConfig::default().block_time_high_secs,
            max_transactions_per_block: 100,
            block_reward: Amount::from_integer(5_000_000),
            faucet_address: String::from(DEFAULT_FAUCET_ADDRESS),
            faucet_amount: Amount::from_integer(1_000_000_000_000),
            safe_confirmations: 1,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 2_000,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let text = fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml(&text)?
            }
            None => Config::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = env::var(NODE_ADDRESS_KEY) {
            self.node_addr = addr;
        }
        if let Ok(addr) = env::var(MINING_ADDRESS_KEY) {
            self.mining_address = Some(addr);
        }
        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            self.node_id = Some(node_id);
        }
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(peers) = env::var(PEERS_KEY) {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_time_low_secs > self.block_time_high_secs {
            return Err(BlockchainError::Config(format!(
                "block_time_low_secs ({}) exceeds block_time_high_secs ({})",
                self.block_time_low_secs, self.block_time_high_secs
            )));
        }
        if self.max_transactions_per_block == 0 {
            return Err(BlockchainError::Config(
                "max_transactions_per_block must be at least 1".to_string(),
            ));
        }
        if !crate::core::transaction::is_valid_address(&self.faucet_address) {
            return Err(BlockchainError::InvalidAddress(self.faucet_address.clone()));
        }
        if let Some(addr) = &self.mining_address {
            if !crate::core::transaction::is_valid_address(addr) {
                return Err(BlockchainError::InvalidAddress(addr.clone()));
            }
        }
        if self.block_reward.is_negative() || self.faucet_amount.is_negative() {
            return Err(BlockchainError::Config(
                "block_reward and faucet_amount must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn difficulty(&self) -> DifficultyConfig {
        DifficultyConfig {
            initial_difficulty: self.initial_difficulty,
            block_time_low_secs: self.block_time_low_secs,
            block_time_high_secs: self.block_time_high_secs,
        }
    }

    /// Extract the port from the node address (e.g., "127.0.0.1:2001" -> "2001")
    pub fn port_suffix(&self) -> String {
        if let Some(port) = self.node_addr.split(':').next_back() {
            port.to_string()
        } else {
            "default".to_string()
        }
    }
}
