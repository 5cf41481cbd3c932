//! # Shared Types Crate
//!
//! Chain entities shared by the consensus core (`hc-01-consensus`) and the
//! block maker (`hc-02-block-maker`).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: block, transaction, proof and destination
//!   layouts are defined once, here.
//! - **Canonical Ordering**: [`Destination`] derives `Ord`; maps keyed by
//!   destination iterate identically on every node.
//! - **Height-in-hash**: block hashes embed the block height.

pub mod block;
pub mod crypto;
pub mod destination;
pub mod entities;
pub mod errors;
pub mod proof;
pub mod transaction;

pub use block::{Block, BlockType, BLOCK_VERSION};
pub use destination::{Destination, TemplateId, TemplateType};
pub use entities::*;
pub use errors::{decode, encode, CodecError};
pub use primitive_types::{H256, U256};
pub use proof::{
    BlockProof, ProofOfDelegate, ProofOfHashWork, ProofOfPiggyback, POW_ALGO_KECCAK,
};
pub use transaction::{CertData, Transaction, TxDataKey, TxType};
