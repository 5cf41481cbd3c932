//! # Consensus Metrics
//!
//! Prometheus metrics for the block chain service.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! hc-01-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `consensus_blocks_accepted_total` - Counter of accepted blocks, by block type
//! - `consensus_blocks_rejected_total` - Counter of rejected blocks, by error code
//! - `consensus_cache_lookups_total` - Counter of cache lookups, by cache and outcome
//! - `consensus_vote_reward_calculations_total` - Counter of vote reward period computations

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref BLOCKS_ACCEPTED: IntCounterVec = register_int_counter_vec!(
        "consensus_blocks_accepted_total",
        "Total number of blocks accepted into storage",
        &["block_type"]
    )
    .expect("Failed to create BLOCKS_ACCEPTED metric");

    pub static ref BLOCKS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "consensus_blocks_rejected_total",
        "Total number of blocks rejected",
        &["code"]
    )
    .expect("Failed to create BLOCKS_REJECTED metric");

    pub static ref CACHE_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "consensus_cache_lookups_total",
        "Consensus cache lookups",
        &["cache", "outcome"]
    )
    .expect("Failed to create CACHE_LOOKUPS metric");

    pub static ref VOTE_REWARD_CALCULATIONS: IntCounter = register_int_counter!(
        "consensus_vote_reward_calculations_total",
        "Vote reward periods computed (cache misses)"
    )
    .expect("Failed to create VOTE_REWARD_CALCULATIONS metric");
}

#[cfg(feature = "metrics")]
pub fn record_block_accepted(block_type: &str) {
    BLOCKS_ACCEPTED.with_label_values(&[block_type]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_block_rejected(code: &str) {
    BLOCKS_REJECTED.with_label_values(&[code]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_cache_lookup(cache: &str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS.with_label_values(&[cache, outcome]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_vote_reward_calculation() {
    VOTE_REWARD_CALCULATIONS.inc();
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_block_accepted(_block_type: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_block_rejected(_code: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_cache_lookup(_cache: &str, _hit: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_vote_reward_calculation() {}
