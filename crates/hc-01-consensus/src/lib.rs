//! # hc-01-consensus
//!
//! Consensus core of the hybrid chain.
//!
//! ## Architecture
//!
//! The primary chain is produced by delegated proof of stake: delegates
//! enroll with CERT transactions, reveal committed secrets in the block
//! that follows, and the revealed shares pick a weighted ballot whose
//! leader mints the next block. When no agreement forms, anyone may mint a
//! proof-of-work block instead.
//!
//! Forks hang off the primary chain through origin blocks. Their
//! subsidiary, extended and vacant blocks piggyback on the agreement of a
//! primary reference block and inherit its trust.
//!
//! ```text
//!  BlockMaker ──add_new_block──→ [BlockChain] ──storage_new_block──→ [BlockContainer]
//!                                     │
//!                     CoreProtocol (stateless rules)
//!                     ConsensusCaches (enrolled / agreement / piggyback / rewards)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hc_01_consensus::{BlockChain, BlockChainApi, BlockChainDependencies, ConsensusParams};
//!
//! let chain = BlockChain::new(BlockChainDependencies {
//!     container,
//!     params: Arc::new(ConsensusParams::testnet()),
//!     genesis: genesis_block.hash(),
//! });
//! chain.insert_genesis_block(&genesis_block)?;
//! let update = chain.add_new_block(&block)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod metrics;
pub mod params;
pub mod ports;
pub mod service;
pub mod state;

// Re-export main types
pub use adapters::InMemoryBlockContainer;
pub use domain::{
    BlockIndex, ConsensusError, ConsensusResult, CoreProtocol, DelegateAgreement,
    DelegateEnrolled, PublishedShares, TemplateKind,
};
pub use params::{ConsensusParams, Network};
pub use ports::{
    BlockChainApi, BlockChainUpdate, BlockContainer, ForkStatus, FunctionId, StateRootOutcome,
    SystemTimeSource, TimeSource,
};
pub use service::{BlockChain, BlockChainDependencies};
