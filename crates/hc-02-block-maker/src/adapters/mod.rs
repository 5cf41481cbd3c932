//! Adapters wiring the block maker ports to the local chain
//!
//! - `LocalConsensus`: agreement from the chain and this node's secrets
//! - `LocalWorkService`: proof-of-work templates and submission
//! - `ChainDispatcher`: block admission into the chain
//! - `InMemoryTxPool`: pending transactions

mod chain_dispatcher;
mod local_consensus;
mod local_work;
mod memory_pool;

pub use chain_dispatcher::ChainDispatcher;
pub use local_consensus::LocalConsensus;
pub use local_work::LocalWorkService;
pub use memory_pool::InMemoryTxPool;
