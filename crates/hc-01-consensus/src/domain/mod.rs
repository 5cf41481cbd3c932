//! Domain layer for the consensus subsystem
//!
//! - block_index: arena DAG of stored blocks with per-fork heads
//! - delegate_verify / agreement: enrollment snapshots, shares and ballots
//! - trust: per-block trust and fork choice
//! - core_protocol: stateless block and transaction rules
//! - vote_reward: period reward arithmetic

mod agreement;
mod block_index;
mod checkpoints;
mod core_protocol;
mod delegate_verify;
mod error;
mod reward;
mod template;
mod trust;
mod vote_reward;

pub use agreement::*;
pub use block_index::*;
pub use checkpoints::*;
pub use core_protocol::*;
pub use delegate_verify::*;
pub use error::*;
pub use reward::*;
pub use template::*;
pub use trust::*;
pub use vote_reward::*;
