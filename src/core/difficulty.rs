use crate::core::Block;
use log::info;
use num_bigint::BigInt;
use num_traits::Zero;

const MIN_DIFFICULTY: u32 = 1; // Minimum difficulty
const MILLIS_PER_SECOND: i64 = 1_000;

/// Window the average block interval should stay inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyConfig {
    pub initial_difficulty: u32,
    /// Average below this many seconds raises difficulty
    pub block_time_low_secs: u64,
    /// Average at or above this many seconds lowers difficulty
    pub block_time_high_secs: u64,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            initial_difficulty: 4,
            block_time_low_secs: 5,
            block_time_high_secs: 15,
        }
    }
}

/// Running block-time controller
///
/// Tracks the total time between consecutive blocks (skipping the interval
/// from genesis, whose timestamp is a fixed constant) and nudges the
/// difficulty by one step whenever the running average leaves the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifficultyController {
    config: DifficultyConfig,
    current_difficulty: u32,
    total_block_time: BigInt,
    measured_intervals: u64,
}

impl DifficultyController {
    pub fn new(config: DifficultyConfig) -> Self {
        Self {
            config,
            current_difficulty: config.initial_difficulty.max(MIN_DIFFICULTY),
            total_block_time: BigInt::zero(),
            measured_intervals: 0,
        }
    }

    /// Re-derive the controller state from a whole chain.
    ///
    /// Produces the same state a node reaches by calling
    /// [`on_block_accepted`](Self::on_block_accepted) once per block.
    pub fn replay(config: DifficultyConfig, chain: &[Block]) -> Self {
        let mut controller = Self::new(config);
        for pair in chain.windows(2) {
            controller.on_block_accepted(
                pair[1].get_index(),
                pair[1].get_date_created(),
                pair[0].get_date_created(),
            );
        }
        controller
    }

    /// Account for a newly accepted block at `index`
    pub fn on_block_accepted(&mut self, index: u64, new_timestamp: i64, previous_timestamp: i64) {
        // The first block after genesis has no meaningful predecessor time
        if index <= 1 {
            return;
        }

        self.total_block_time += BigInt::from(new_timestamp) - BigInt::from(previous_timestamp);
        self.measured_intervals += 1;

        let average_millis = &self.total_block_time / BigInt::from(self.measured_intervals);
        let low = BigInt::from(self.config.block_time_low_secs) * BigInt::from(MILLIS_PER_SECOND);
        let high =
            BigInt::from(self.config.block_time_high_secs) * BigInt::from(MILLIS_PER_SECOND);

        let previous = self.current_difficulty;
        if average_millis < low {
            self.current_difficulty = self.current_difficulty.saturating_add(1);
        } else if average_millis >= high {
            self.current_difficulty = self
                .current_difficulty
                .saturating_sub(1)
                .max(MIN_DIFFICULTY);
        }

        if previous != self.current_difficulty {
            info!(
                "Difficulty adjustment at block {index}: {previous} -> {} (average {average_millis}ms over {} intervals)",
                self.current_difficulty, self.measured_intervals
            );
        }
    }

    pub fn current_difficulty(&self) -> u32 {
        self.current_difficulty
    }

    /// Accumulated milliseconds between measured blocks
    pub fn total_block_time(&self) -> &BigInt {
        &self.total_block_time
    }

    pub fn config(&self) -> DifficultyConfig {
        self.config
    }
}
