//! Tracks forks whose head stopped following the primary chain.
//!
//! A fork more than `FORK_LAST_BLOCK_COUNT` heights behind is probably
//! missing blocks from its own producers. Before filling the gap with
//! vacant blocks the maker waits `FORK_WAIT_BLOCK_COUNT` primary heights
//! (longer for larger gaps) for the head to move.

use std::collections::HashMap;

use shared_types::Hash;

use super::entities::{FORK_LAST_BLOCK_COUNT, FORK_WAIT_BLOCK_COUNT, FORK_WAIT_BLOCK_SECT};

#[derive(Debug, Default)]
pub struct ForkLagTracker {
    /// fork -> (head height when first seen lagging, primary height then)
    seen: HashMap<Hash, (u32, u32)>,
}

impl ForkLagTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a head at `head_height` lags the primary chain enough to be
    /// tracked.
    pub fn is_lagging(head_height: u32, primary_height: u32) -> bool {
        head_height < primary_height.saturating_sub(FORK_LAST_BLOCK_COUNT)
    }

    /// Heights to wait before replenishing a gap of `gap` heights.
    pub fn wait_heights(gap: u32) -> u32 {
        FORK_WAIT_BLOCK_COUNT.saturating_mul(gap / FORK_WAIT_BLOCK_SECT + 1)
    }

    /// Records the lag of `fork` and tells whether it waited long enough.
    pub fn should_replenish(&mut self, fork: &Hash, head_height: u32, primary_height: u32) -> bool {
        let entry = self
            .seen
            .entry(*fork)
            .or_insert((head_height, primary_height));
        if entry.0 != head_height {
            *entry = (head_height, primary_height);
        }
        let waited = primary_height.saturating_sub(entry.1);
        let gap = primary_height.saturating_sub(head_height);
        waited >= Self::wait_heights(gap)
    }

    pub fn forget(&mut self, fork: &Hash) {
        self.seen.remove(fork);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
