//! Blocks and block types.

use std::collections::HashSet;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::crypto::sign_hash;
use crate::entities::{height_of, keccak, keccak_concat, with_height, ForkProfile, Hash};
use crate::proof::{BlockProof, ProofOfDelegate, ProofOfHashWork, ProofOfPiggyback};
use crate::transaction::Transaction;

/// Current block version.
pub const BLOCK_VERSION: u16 = 1;

/// Block type. The discriminants are the on-chain type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum BlockType {
    Genesis = 0xffff,
    Origin = 0xff00,
    Primary = 0x0001,
    Subsidiary = 0x0002,
    Extended = 0x0004,
    Vacant = 0x0008,
}

impl BlockType {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn is_genesis(self) -> bool {
        self == BlockType::Genesis
    }

    /// Genesis and origin blocks both start a fork.
    pub fn is_origin(self) -> bool {
        matches!(self, BlockType::Genesis | BlockType::Origin)
    }

    /// Genesis counts as a primary block.
    pub fn is_primary(self) -> bool {
        matches!(self, BlockType::Genesis | BlockType::Primary)
    }

    pub fn is_subsidiary(self) -> bool {
        self == BlockType::Subsidiary
    }

    pub fn is_extended(self) -> bool {
        self == BlockType::Extended
    }

    pub fn is_vacant(self) -> bool {
        self == BlockType::Vacant
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockType::Genesis => "genesis",
            BlockType::Origin => "origin",
            BlockType::Primary => "primary",
            BlockType::Subsidiary => "subsidiary",
            BlockType::Extended => "extended",
            BlockType::Vacant => "vacant",
        }
    }
}

/// A block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub version: u16,
    pub block_type: BlockType,
    pub timestamp: u32,
    /// Per-fork block counter, strictly increasing along a fork.
    pub number: u64,
    pub prev: Hash,
    pub merkle_root: Hash,
    pub state_root: Hash,
    pub receipts_root: Hash,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub proofs: Vec<BlockProof>,
    pub mint_tx: Transaction,
    pub txs: Vec<Transaction>,
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct HashedHeader<'a> {
    version: u16,
    block_type: BlockType,
    timestamp: u32,
    number: u64,
    prev: &'a Hash,
    merkle_root: &'a Hash,
    state_root: &'a Hash,
    receipts_root: &'a Hash,
    gas_limit: u64,
    gas_used: u64,
    proofs: &'a [BlockProof],
    mint: Hash,
}

#[derive(Serialize)]
struct PowHeader<'a> {
    version: u16,
    block_type: BlockType,
    timestamp: u32,
    prev: &'a Hash,
    proofs: &'a [BlockProof],
}

impl Block {
    /// Empty block of `block_type` on top of `prev`.
    pub fn new(block_type: BlockType, prev: Hash, timestamp: u32, number: u64) -> Self {
        Self {
            version: BLOCK_VERSION,
            block_type,
            timestamp,
            number,
            prev,
            merkle_root: Hash::zero(),
            state_root: Hash::zero(),
            receipts_root: Hash::zero(),
            gas_limit: 0,
            gas_used: 0,
            proofs: Vec::new(),
            mint_tx: Transaction::default(),
            txs: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// Block height. Extended blocks share the height of their predecessor.
    pub fn height(&self) -> u32 {
        if self.block_type.is_genesis() || self.prev.is_zero() {
            0
        } else if self.block_type.is_extended() {
            height_of(&self.prev)
        } else {
            height_of(&self.prev).saturating_add(1)
        }
    }

    /// Block hash with the height embedded in the top four bytes.
    pub fn hash(&self) -> Hash {
        let header = HashedHeader {
            version: self.version,
            block_type: self.block_type,
            timestamp: self.timestamp,
            number: self.number,
            prev: &self.prev,
            merkle_root: &self.merkle_root,
            state_root: &self.state_root,
            receipts_root: &self.receipts_root,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            proofs: &self.proofs,
            mint: self.mint_tx.hash(),
        };
        let encoded = bincode::serialize(&header).unwrap_or_default();
        with_height(keccak(&encoded), self.height())
    }

    /// Digest a proof-of-work search iterates over.
    pub fn pow_hash(&self) -> Hash {
        let header = PowHeader {
            version: self.version,
            block_type: self.block_type,
            timestamp: self.timestamp,
            prev: &self.prev,
            proofs: &self.proofs,
        };
        keccak(&bincode::serialize(&header).unwrap_or_default())
    }

    /// Merkle root over the hashes of `txs`. Odd levels repeat the last node.
    pub fn calc_merkle_root(&self) -> Hash {
        let mut level: Vec<Hash> = self.txs.iter().map(Transaction::hash).collect();
        if level.is_empty() {
            return Hash::zero();
        }
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&pair[0]);
                    keccak_concat([pair[0].as_bytes(), right.as_bytes()])
                })
                .collect();
        }
        level[0]
    }

    pub fn has_duplicate_tx(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.txs.len());
        self.txs.iter().any(|tx| !seen.insert(tx.hash()))
    }

    pub fn serialized_size(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(u64::MAX) as usize
    }

    pub fn sign(&mut self, key: &SigningKey) {
        self.signature = sign_hash(key, &self.hash());
    }

    /// Replaces the proof of the same kind, or appends it.
    pub fn set_proof(&mut self, proof: BlockProof) {
        let same_kind = |p: &BlockProof| std::mem::discriminant(p) == std::mem::discriminant(&proof);
        match self.proofs.iter_mut().find(|p| same_kind(p)) {
            Some(slot) => *slot = proof,
            None => self.proofs.push(proof),
        }
    }

    pub fn delegate_proof(&self) -> Option<&ProofOfDelegate> {
        self.proofs.iter().find_map(|p| match p {
            BlockProof::Delegate(proof) => Some(proof),
            _ => None,
        })
    }

    pub fn piggyback_proof(&self) -> Option<&ProofOfPiggyback> {
        self.proofs.iter().find_map(|p| match p {
            BlockProof::Piggyback(proof) => Some(proof),
            _ => None,
        })
    }

    pub fn hash_work_proof(&self) -> Option<&ProofOfHashWork> {
        self.proofs.iter().find_map(|p| match p {
            BlockProof::HashWork(proof) => Some(proof),
            _ => None,
        })
    }

    pub fn hash_work_proof_mut(&mut self) -> Option<&mut ProofOfHashWork> {
        self.proofs.iter_mut().find_map(|p| match p {
            BlockProof::HashWork(proof) => Some(proof),
            _ => None,
        })
    }

    pub fn profile(&self) -> Option<&ForkProfile> {
        self.proofs.iter().find_map(|p| match p {
            BlockProof::Profile(profile) => Some(profile),
            _ => None,
        })
    }
}
