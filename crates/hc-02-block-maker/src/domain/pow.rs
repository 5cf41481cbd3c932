//! Nonce search over the proof-of-work header.

use hc_01_consensus::domain::pow_hash_meets_target;
use shared_types::{Block, Hash, TxType};

use super::entities::TipStatus;

/// Initial nonce of a search started at `now`: the low 24 bits of the clock
/// in the upper bytes so parallel miners start apart.
pub fn initial_nonce(now: u32) -> u64 {
    (u64::from(now) % 0x00FF_FFFF) << 40
}

/// Tries `rounds` nonces on `block`, advancing the hash-work proof nonce.
///
/// Returns the winning pow hash, leaving the proof at the winning nonce.
/// Without a hash-work proof nothing is searched.
#[tracing::instrument(skip(block), fields(height = block.height()))]
pub fn search_nonce(block: &mut Block, bits: u8, rounds: u64) -> Option<Hash> {
    block.hash_work_proof_mut()?;
    for _ in 0..rounds {
        let hash = block.pow_hash();
        if pow_hash_meets_target(&hash, bits) {
            return Some(hash);
        }
        let proof = block.hash_work_proof_mut()?;
        proof.nonce = proof.nonce.wrapping_add(1);
    }
    None
}

/// Decides when the proof-of-work task mines on the current tip.
///
/// Mining waits one spacing after the tip, two after a stake tip, and half
/// a spacing after the tip was first seen so a syncing node stays quiet.
#[derive(Debug, Default)]
pub struct PowSchedule {
    tip_time: u32,
    sync_begin: u32,
}

impl PowSchedule {
    pub fn ready(&mut self, tip: &TipStatus, now: u32, spacing: u32) -> bool {
        if tip.height == 0 {
            return true;
        }
        if tip.timestamp != self.tip_time {
            self.tip_time = tip.timestamp;
            self.sync_begin = now;
        }
        let mut start = tip.timestamp.saturating_add(spacing);
        if tip.mint_type == TxType::Stake {
            start = start.saturating_add(spacing);
        }
        now >= start && now.saturating_sub(self.sync_begin) >= spacing / 2
    }
}
