//! Typed block proofs.
//!
//! Every proof starts with the agreement header (`weight`, `agreement`) of
//! the primary-chain consensus round it belongs to.

use serde::{Deserialize, Serialize};

use crate::destination::Destination;
use crate::entities::{ForkProfile, Hash};

/// Hash-work algorithm id carried in [`ProofOfHashWork::algo`].
pub const POW_ALGO_KECCAK: u8 = 1;

/// Proof of a delegated proof-of-stake primary block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfDelegate {
    pub weight: u8,
    pub agreement: Hash,
    /// Encoded secret shares published by the producing delegate.
    pub published: Vec<u8>,
}

/// Proof linking a fork block to the primary block whose agreement it rides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfPiggyback {
    pub weight: u8,
    pub agreement: Hash,
    pub ref_block: Hash,
}

/// Proof of a proof-of-work primary block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfHashWork {
    pub weight: u8,
    pub agreement: Hash,
    pub algo: u8,
    pub bits: u8,
    pub dest_mint: Destination,
    pub nonce: u64,
}

/// One proof attached to a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockProof {
    Delegate(ProofOfDelegate),
    Piggyback(ProofOfPiggyback),
    HashWork(ProofOfHashWork),
    Profile(ForkProfile),
}
