//! Dispatches made blocks straight into the local chain.

use std::sync::Arc;

use async_trait::async_trait;
use hc_01_consensus::{BlockChainApi, BlockChainUpdate, ConsensusResult};
use parking_lot::Mutex;
use shared_types::{Block, Hash};

use crate::domain::AgreementBlock;
use crate::ports::BlockDispatcher;

pub struct ChainDispatcher {
    chain: Arc<dyn BlockChainApi>,
    last_consensus: Mutex<Option<Hash>>,
}

impl ChainDispatcher {
    pub fn new(chain: Arc<dyn BlockChainApi>) -> Self {
        Self {
            chain,
            last_consensus: Mutex::new(None),
        }
    }

    /// Predecessor of the last agreement reported through `set_consensus`.
    pub fn last_consensus(&self) -> Option<Hash> {
        *self.last_consensus.lock()
    }
}

#[async_trait]
impl BlockDispatcher for ChainDispatcher {
    async fn add_new_block(&self, block: &Block) -> ConsensusResult<BlockChainUpdate> {
        self.chain.add_new_block(block)
    }

    async fn set_consensus(&self, agreement: &AgreementBlock) {
        tracing::debug!(
            "[hc-02] Consensus after {} used, weight {}",
            agreement.prev,
            agreement.agreement.weight
        );
        *self.last_consensus.lock() = Some(agreement.prev);
    }
}
