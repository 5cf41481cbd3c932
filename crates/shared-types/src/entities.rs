//! # Core Domain Entities
//!
//! Primitive aliases and the small value types every subsystem shares.
//!
//! ## Height-in-hash
//!
//! Block hashes carry the block height in their first four bytes
//! (big-endian). Any component holding only a hash can therefore recover the
//! height without a storage lookup, see [`height_of`].

use primitive_types::{H256, U256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::destination::Destination;

/// A 32-byte keccak hash.
pub type Hash = H256;

/// Token amounts in base units.
pub type Amount = U256;

/// Base units per coin.
pub const COIN: u64 = 1_000_000_000_000_000_000;

/// Returns `n` whole coins as an [`Amount`].
pub fn coin(n: u64) -> Amount {
    U256::from(n) * U256::from(COIN)
}

/// Keccak-256 of `data`.
pub fn keccak(data: &[u8]) -> Hash {
    H256::from_slice(&Keccak256::digest(data))
}

/// Keccak-256 over the concatenation of `parts`.
pub fn keccak_concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    H256::from_slice(&hasher.finalize())
}

/// Recovers the block height embedded in a block hash.
pub fn height_of(hash: &Hash) -> u32 {
    let b = hash.as_bytes();
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Overwrites the first four bytes of `hash` with `height`.
pub fn with_height(mut hash: Hash, height: u32) -> Hash {
    hash.as_bytes_mut()[..4].copy_from_slice(&height.to_be_bytes());
    hash
}

/// Account state of a destination at some block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestState {
    /// Spendable balance.
    pub balance: Amount,
    /// Number of transactions sent.
    pub nonce: u64,
}

impl DestState {
    /// A sender's next transaction must carry exactly `nonce + 1`.
    pub fn verify_tx_nonce(&self, tx_nonce: u64) -> bool {
        tx_nonce == self.nonce.wrapping_add(1)
    }
}

/// Parameters a fork is created with. Carried by genesis and origin blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkProfile {
    /// Unique human readable name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// Chain id.
    pub chain_id: u32,
    /// Initial amount minted to `owner` by the origin block.
    pub amount: Amount,
    /// Per-block mint reward before halving.
    pub mint_reward: Amount,
    /// Halving cycle in blocks, 0 disables halving.
    pub halve_cycle: u32,
    /// Private forks only accept blocks from the owner.
    pub is_private: bool,
    /// Parent fork hash, zero for the primary chain.
    pub parent: Hash,
    /// Owner of the initial supply.
    pub owner: Destination,
    /// Height on the parent chain the fork branches at.
    pub joint_height: u32,
}

impl ForkProfile {
    /// Whether the profile carries everything a fork needs.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.symbol.is_empty() && !self.owner.is_null()
    }
}

/// Snapshot of a fork's head block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStatus {
    pub fork: Hash,
    pub hash: Hash,
    pub prev: Hash,
    pub height: u32,
    pub number: u64,
    pub timestamp: u32,
    /// Mint type of the head, `None` before any block is known.
    pub mint_type: Option<crate::transaction::TxType>,
    pub is_primary: bool,
}
