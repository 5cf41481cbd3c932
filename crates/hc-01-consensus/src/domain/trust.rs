//! Chain trust and fork choice.

use shared_types::{encode, keccak_concat, Destination, U256};

use super::block_index::BlockIndex;

/// Trust of a proof-of-work primary block.
///
/// A 16-bit value drawn from `keccak(height || mint)`. A zero draw retries
/// at `height - 1`; a second zero clamps to 1, so the result is never zero.
pub fn pow_block_trust(height: u32, dest_mint: &Destination) -> U256 {
    let mint = encode(dest_mint);
    for h in [height, height.saturating_sub(1)] {
        let hash = keccak_concat([&h.to_be_bytes()[..], &mint[..]]);
        let b = hash.as_bytes();
        let value = u16::from_be_bytes([b[30], b[31]]);
        if value != 0 {
            return U256::from(value);
        }
    }
    U256::one()
}

/// Trust a fork block inherits from its primary anchor: the anchor's own
/// per-block delta.
pub fn inherited_trust(reference: &BlockIndex, reference_prev: Option<&BlockIndex>) -> U256 {
    let prev = reference_prev.map(|p| p.chain_trust).unwrap_or_default();
    reference.chain_trust.saturating_sub(prev)
}

/// A competing branch wins only with strictly more cumulative trust.
pub fn is_better_chain(candidate: U256, current: U256) -> bool {
    candidate > current
}

/// Whether a fork adopts a new block as its head.
///
/// Equal trust is only accepted when the new block extends the head through
/// vacant blocks, which carry no trust of their own.
pub fn should_adopt(candidate: U256, head: U256, extends_head: bool) -> bool {
    is_better_chain(candidate, head) || (candidate == head && extends_head)
}
