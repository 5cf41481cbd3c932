//! # Block Maker Metrics
//!
//! In-process counters for [`MakerStatus`](crate::ports::MakerStatus), plus
//! Prometheus counters behind the `metrics` feature:
//!
//! - `maker_blocks_produced_total` - Blocks dispatched, by block type
//! - `maker_pow_hashes_total` - Proof-of-work hashes computed
//! - `maker_vacant_replenished_total` - Vacant blocks made for stalled forks

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref BLOCKS_PRODUCED: IntCounterVec = register_int_counter_vec!(
        "maker_blocks_produced_total",
        "Total number of blocks dispatched by the block maker",
        &["block_type"]
    )
    .expect("Failed to create BLOCKS_PRODUCED metric");

    pub static ref POW_HASHES: IntCounter = register_int_counter!(
        "maker_pow_hashes_total",
        "Proof-of-work hashes computed"
    )
    .expect("Failed to create POW_HASHES metric");

    pub static ref VACANT_REPLENISHED: IntCounter = register_int_counter!(
        "maker_vacant_replenished_total",
        "Vacant blocks made for stalled forks"
    )
    .expect("Failed to create VACANT_REPLENISHED metric");
}

#[cfg(feature = "metrics")]
fn export_block_produced(block_type: &str) {
    BLOCKS_PRODUCED.with_label_values(&[block_type]).inc();
}

#[cfg(feature = "metrics")]
fn export_pow_hashes(count: u64) {
    POW_HASHES.inc_by(count);
}

#[cfg(feature = "metrics")]
fn export_vacant_replenished() {
    VACANT_REPLENISHED.inc();
}

#[cfg(not(feature = "metrics"))]
fn export_block_produced(_block_type: &str) {}

#[cfg(not(feature = "metrics"))]
fn export_pow_hashes(_count: u64) {}

#[cfg(not(feature = "metrics"))]
fn export_vacant_replenished() {}

/// Counters of one block maker
#[derive(Debug, Default)]
pub struct MakerMetrics {
    /// Blocks accepted by the chain
    pub blocks_produced: AtomicU64,

    /// Vacant blocks among them
    pub vacant_blocks: AtomicU64,

    /// Hashes tried by the proof-of-work search
    pub pow_hashes: AtomicU64,

    /// Blocks the chain refused
    pub dispatch_failures: AtomicU64,
}

impl MakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_block_produced(&self, block_type: &str) {
        self.blocks_produced.fetch_add(1, Ordering::Relaxed);
        if block_type == "vacant" {
            self.vacant_blocks.fetch_add(1, Ordering::Relaxed);
            export_vacant_replenished();
        }
        export_block_produced(block_type);
    }

    pub fn record_pow_hashes(&self, count: u64) {
        self.pow_hashes.fetch_add(count, Ordering::Relaxed);
        export_pow_hashes(count);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocks_produced(&self) -> u64 {
        self.blocks_produced.load(Ordering::Relaxed)
    }

    pub fn vacant_blocks(&self) -> u64 {
        self.vacant_blocks.load(Ordering::Relaxed)
    }

    pub fn pow_hashes(&self) -> u64 {
        self.pow_hashes.load(Ordering::Relaxed)
    }

    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }
}
