//! Domain layer for the block maker
//!
//! Everything here is synchronous and free of I/O.
//!
//! - entities: tip snapshots, agreements, maker profiles and timing constants
//! - hash_rate: batch size tuning for the proof-of-work search
//! - fork_lag: when a stalled fork gets vacant blocks
//! - secrets: enrollment secret commitments and reveals
//! - pow: nonce search

mod entities;
pub mod fork_lag;
pub mod hash_rate;
pub mod pow;
pub mod secrets;

pub use entities::*;
pub use fork_lag::ForkLagTracker;
pub use hash_rate::HashRateTuner;
pub use pow::{initial_nonce, search_nonce, PowSchedule};
pub use secrets::SecretStore;
