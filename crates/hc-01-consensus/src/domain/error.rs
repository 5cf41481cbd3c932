//! Error types for the consensus subsystem
//!
//! A closed taxonomy. Every validation step returns the first failure by
//! value and callers propagate it unchanged.

use shared_types::Hash;

/// Consensus error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Block already known: {0:?}")]
    AlreadyHave(Hash),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid fork: {0}")]
    BlockInvalidFork(String),

    #[error("Invalid block type: {0}")]
    BlockTypeInvalid(String),

    #[error("Invalid proof of stake: {0}")]
    BlockProofOfStakeInvalid(String),

    #[error("Invalid proof of work: {0}")]
    BlockProofOfWorkInvalid(String),

    #[error("Timestamp out of range: {0}")]
    BlockTimestampOutOfRange(String),

    #[error("Invalid block transactions: {0}")]
    BlockTransactionsInvalid(String),

    #[error("Cert transactions out of bound: {0}")]
    BlockCertTxOutOfBound(String),

    #[error("Invalid coinbase: {0}")]
    BlockCoinbaseInvalid(String),

    #[error("Block oversize: {size} > {limit}")]
    BlockOversize { size: usize, limit: usize },

    #[error("Merkle root mismatch")]
    BlockTxHashMerkleRootInvalid,

    #[error("Duplicated transaction in block")]
    BlockDuplicatedTransaction,

    #[error("Invalid block signature")]
    BlockSignatureInvalid,

    #[error("Checkpoint mismatch at height {height}: expected {expected:?}")]
    BlockCheckpointMismatch { height: u32, expected: Hash },

    #[error("Invalid block format: {0}")]
    BlockFormatInvalid(String),

    #[error("Invalid transaction: {0}")]
    TransactionInvalid(String),

    #[error("Invalid transaction input: {0}")]
    TransactionInputInvalid(String),

    #[error("Invalid transaction signature")]
    TransactionSignatureInvalid,

    #[error("Missing previous: {0}")]
    MissingPrev(String),
}

impl ConsensusError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ConsensusError::AlreadyHave(_) => "ERR_ALREADY_HAVE",
            ConsensusError::StorageError(_) => "ERR_SYS_STORAGE_ERROR",
            ConsensusError::BlockInvalidFork(_) => "ERR_BLOCK_INVALID_FORK",
            ConsensusError::BlockTypeInvalid(_) => "ERR_BLOCK_TYPE_INVALID",
            ConsensusError::BlockProofOfStakeInvalid(_) => "ERR_BLOCK_PROOF_OF_STAKE_INVALID",
            ConsensusError::BlockProofOfWorkInvalid(_) => "ERR_BLOCK_PROOF_OF_WORK_INVALID",
            ConsensusError::BlockTimestampOutOfRange(_) => "ERR_BLOCK_TIMESTAMP_OUT_OF_RANGE",
            ConsensusError::BlockTransactionsInvalid(_) => "ERR_BLOCK_TRANSACTIONS_INVALID",
            ConsensusError::BlockCertTxOutOfBound(_) => "ERR_BLOCK_CERTTX_OUT_OF_BOUND",
            ConsensusError::BlockCoinbaseInvalid(_) => "ERR_BLOCK_COINBASE_INVALID",
            ConsensusError::BlockOversize { .. } => "ERR_BLOCK_OVERSIZE",
            ConsensusError::BlockTxHashMerkleRootInvalid => "ERR_BLOCK_TXHASH_MERKLE_ROOT_INVALID",
            ConsensusError::BlockDuplicatedTransaction => "ERR_BLOCK_DUPLICATED_TRANSACTION",
            ConsensusError::BlockSignatureInvalid => "ERR_BLOCK_SIGNATURE_INVALID",
            ConsensusError::BlockCheckpointMismatch { .. } => "ERR_BLOCK_CHECKPOINT_MISMATCH",
            ConsensusError::BlockFormatInvalid(_) => "ERR_BLOCK_FORMAT_INVALID",
            ConsensusError::TransactionInvalid(_) => "ERR_TRANSACTION_INVALID",
            ConsensusError::TransactionInputInvalid(_) => "ERR_TRANSACTION_INPUT_INVALID",
            ConsensusError::TransactionSignatureInvalid => "ERR_TRANSACTION_SIGNATURE_INVALID",
            ConsensusError::MissingPrev(_) => "ERR_MISSING_PREV",
        }
    }

    /// Peers sending a block that fails with this error are not at fault.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ConsensusError::AlreadyHave(_)
                | ConsensusError::MissingPrev(_)
                | ConsensusError::StorageError(_)
        )
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
