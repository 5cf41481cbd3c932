//! Error types for the block maker subsystem

use hc_01_consensus::ConsensusError;
use shared_types::Destination;
use thiserror::Error;

/// Result type alias for block maker operations
pub type Result<T> = std::result::Result<T, BlockMakerError>;

/// Errors that can occur while making blocks
#[derive(Debug, Error)]
pub enum BlockMakerError {
    /// The chain refused a query or a block
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Transaction pool communication error
    #[error("Tx pool error: {0}")]
    TxPool(String),

    /// Mining service communication error
    #[error("Work service error: {0}")]
    Work(String),

    /// No agreement could be computed for the next height
    #[error("Agreement unavailable: {0}")]
    AgreementUnavailable(String),

    /// The block slot time could not be derived from the previous block
    #[error("No slot time after {0:?}")]
    NoSlotTime(shared_types::Hash),

    /// Reward transactions do not fit in one block
    #[error("Reward txs need {size} bytes, {available} available")]
    RewardTxOversize {
        /// Serialized size of the reward transactions
        size: usize,
        /// Room left in the block
        available: usize,
    },

    /// This node holds no key for the ballot leader
    #[error("No maker profile for {0}")]
    MissingProfile(Destination),

    /// Proof-of-work requested without a work profile
    #[error("No proof-of-work profile configured")]
    NoWorkProfile,

    /// The block does not match a configured checkpoint
    #[error("Checkpoint mismatch at height {0}")]
    CheckpointMismatch(u32),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The maker was halted
    #[error("Block maker halted")]
    Halted,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BlockMakerError {
    /// Check if error is recoverable (the maker logs it and waits for the
    /// next opportunity)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Consensus(e) => e.is_benign() || matches!(e, ConsensusError::StorageError(_)),
            Self::TxPool(_)
            | Self::Work(_)
            | Self::AgreementUnavailable(_)
            | Self::NoSlotTime(_)
            | Self::MissingProfile(_) => true,
            _ => false,
        }
    }

    /// Check if error is critical (should stop production)
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::InvalidKey(_) | Self::Internal(_)
        )
    }
}
