//! Outbound ports (driven side - SPI)

use async_trait::async_trait;
use hc_01_consensus::{BlockChainUpdate, ConsensusResult};
use shared_types::{Block, Destination, Hash, Transaction};

use crate::domain::{AgreementBlock, NextConsensus, WorkTemplate};
use crate::error::Result;

/// Port: Delegate agreement for the next primary height
#[async_trait]
pub trait ConsensusEngine: Send + Sync {
    /// Agreement for the block after the current primary head, or how long
    /// to wait for it.
    async fn get_next_consensus(&self) -> Result<NextConsensus>;
}

/// Port: Pending transactions
#[async_trait]
pub trait TxPool: Send + Sync {
    /// Transactions for a block of `fork` after `prev` at `time`, in block
    /// order, at most `max_size` serialized bytes.
    async fn fetch_arrange_block_tx(
        &self,
        fork: &Hash,
        prev: &Hash,
        time: u32,
        max_size: usize,
    ) -> Result<Vec<Transaction>>;
}

/// Port: Block admission
#[async_trait]
pub trait BlockDispatcher: Send + Sync {
    async fn add_new_block(&self, block: &Block) -> ConsensusResult<BlockChainUpdate>;

    /// Tells consensus the agreement it produced was used.
    async fn set_consensus(&self, agreement: &AgreementBlock);
}

/// Port: Proof-of-work templates and submission
#[async_trait]
pub trait WorkService: Send + Sync {
    /// Proof-of-work block minting to `dest`, or `None` while the next
    /// primary block cannot be mined.
    async fn get_work(&self, dest: &Destination) -> Result<Option<WorkTemplate>>;

    /// Submits a solved block, returning its hash.
    async fn submit_work(&self, block: &Block) -> Result<Hash>;
}
