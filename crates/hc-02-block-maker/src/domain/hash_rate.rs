//! Hash-rate tuning for the proof-of-work search.
//!
//! The search runs in batches of `rate` hashes. After each batch the block
//! time is compared with the wall clock: if the batch overran by several
//! seconds the rate is divided by the overrun, if it finished within the same
//! second the rate doubles.

use super::entities::INITIAL_HASH_RATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashRateTuner {
    rate: u64,
}

impl Default for HashRateTuner {
    fn default() -> Self {
        Self::new(INITIAL_HASH_RATE)
    }
}

impl HashRateTuner {
    pub fn new(rate: u64) -> Self {
        Self { rate: rate.max(1) }
    }

    /// Hashes to compute in the next batch, never zero.
    pub fn rate(&self) -> u64 {
        self.rate.max(1)
    }

    /// Adjusts the rate after a batch that ended at `net_time` while the
    /// block carries `block_time`.
    ///
    /// Returns the timestamp the block should move to, if any.
    pub fn after_batch(&mut self, block_time: u32, net_time: u32) -> Option<u32> {
        if block_time.saturating_add(1) < net_time {
            let overrun = u64::from(net_time - block_time);
            self.rate = (self.rate / overrun).max(1);
            Some(net_time)
        } else {
            if block_time == net_time {
                self.rate = self.rate.saturating_mul(2);
            }
            None
        }
    }
}
