//! # hc-02-block-maker
//!
//! Block production for the hybrid chain.
//!
//! ## Purpose
//!
//! - Delegated blocks: when the agreement for the next primary height names
//!   a local delegate, mint the block in its slot
//! - Fork blocks: a subsidiary block per followed fork on the same
//!   agreement, vacant blocks for stalled forks, and extended blocks while
//!   transactions wait
//! - Proof of work: mine primary blocks when no agreement forms
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Adapters                                                │
//! │  LocalConsensus · LocalWorkService · ChainDispatcher     │
//! │  InMemoryTxPool                                          │
//! └──────────────────────────────────────────────────────────┘
//!                           │
//! ┌──────────────────────────────────────────────────────────┐
//! │  Ports                                                   │
//! │  Inbound: BlockMakerService                              │
//! │  Outbound: ConsensusEngine, TxPool, BlockDispatcher,     │
//! │            WorkService                                   │
//! └──────────────────────────────────────────────────────────┘
//!                           │
//! ┌──────────────────────────────────────────────────────────┐
//! │  Domain                                                  │
//! │  MakerProfile · SecretStore · HashRateTuner ·            │
//! │  ForkLagTracker · nonce search                           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hc_02_block_maker::{BlockMaker, BlockMakerConfig, BlockMakerDependencies, BlockMakerService};
//!
//! let maker = BlockMaker::new(config, BlockMakerDependencies {
//!     chain: chain.clone(),
//!     consensus: Arc::new(LocalConsensus::new(chain.clone(), secrets, clock.clone())),
//!     tx_pool: pool.clone(),
//!     dispatcher: Arc::new(ChainDispatcher::new(chain.clone())),
//!     work: Arc::new(LocalWorkService::new(chain.clone(), pool)),
//!     clock,
//! })?;
//! maker.start().await?;
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod assembly;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::{ChainDispatcher, InMemoryTxPool, LocalConsensus, LocalWorkService};
pub use config::{BlockMakerConfig, DelegateProfileConfig, NodeMode, PowProfileConfig};
pub use domain::{AgreementBlock, MakerProfile, NextConsensus, SecretStore, TipStatus};
pub use error::{BlockMakerError, Result};
pub use metrics::MakerMetrics;
pub use ports::{
    BlockDispatcher, BlockMakerService, ConsensusEngine, MakerStatus, TxPool, WorkService,
};
pub use service::{BlockMaker, BlockMakerDependencies};
