use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use log::info;
use sled::{Batch, Db, Tree};
use std::path::Path;

const BLOCKS_TREE: &str = "blocks";

/// Blocks on disk, keyed by big-endian height so iteration is chain order
pub struct BlockStore {
    db: Db,
    blocks: Tree,
}

impl BlockStore {
    pub fn open(path: &Path) -> Result<BlockStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        info!("Opened block store at {}", path.display());
        Ok(BlockStore { db, blocks })
    }

    /// Every stored block, lowest height first
    pub fn load(&self) -> Result<Vec<Block>> {
        let mut chain = Vec::new();
        for entry in self.blocks.iter() {
            let (_, value) = entry
                .map_err(|e| BlockchainError::Database(format!("Failed to read block: {e}")))?;
            chain.push(deserialize::<Block>(&value)?);
        }
        Ok(chain)
    }

    pub fn append(&self, block: &Block) -> Result<()> {
        let data = serialize(block)?;
        self.blocks
            .insert(block.get_index().to_be_bytes(), data)
            .map_err(|e| BlockchainError::Database(format!("Failed to store block: {e}")))?;
        self.flush()
    }

    /// Swap the stored chain for `chain` in one atomic batch
    pub fn replace_all(&self, chain: &[Block]) -> Result<()> {
        let mut batch = Batch::default();
        for key in self.blocks.iter().keys() {
            let key = key
                .map_err(|e| BlockchainError::Database(format!("Failed to read block key: {e}")))?;
            batch.remove(key);
        }
        for block in chain {
            batch.insert(block.get_index().to_be_bytes().to_vec(), serialize(block)?);
        }
        self.blocks
            .apply_batch(batch)
            .map_err(|e| BlockchainError::Database(format!("Failed to replace chain: {e}")))?;
        self.flush()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush database: {e}")))?;
        Ok(())
    }
}
