//! Proof-of-work templates built from the local chain.

use std::sync::Arc;

use async_trait::async_trait;
use hc_01_consensus::params::PROOF_OF_WORK_BITS;
use hc_01_consensus::BlockChainApi;
use shared_types::{
    Block, BlockProof, BlockType, Destination, Hash, ProofOfHashWork, Transaction, TxDataKey,
    TxType, POW_ALGO_KECCAK,
};

use crate::assembly::arrange_block_tx;
use crate::domain::WorkTemplate;
use crate::error::{BlockMakerError, Result};
use crate::ports::{TxPool, WorkService};

pub struct LocalWorkService {
    chain: Arc<dyn BlockChainApi>,
    pool: Arc<dyn TxPool>,
    /// Template data attached to the mint when the chain does not know the
    /// mint destination yet.
    template_data: Option<Vec<u8>>,
}

impl LocalWorkService {
    pub fn new(chain: Arc<dyn BlockChainApi>, pool: Arc<dyn TxPool>) -> Self {
        Self {
            chain,
            pool,
            template_data: None,
        }
    }

    pub fn with_template_data(mut self, data: Option<Vec<u8>>) -> Self {
        self.template_data = data;
        self
    }
}

#[async_trait]
impl WorkService for LocalWorkService {
    async fn get_work(&self, dest: &Destination) -> Result<Option<WorkTemplate>> {
        let genesis = self.chain.genesis_hash();
        let Some(last) = self.chain.get_fork_last(&genesis) else {
            return Ok(None);
        };
        let Some(time) = self.chain.get_next_block_timestamp(&last.hash, TxType::Work) else {
            return Ok(None);
        };
        let reward = self.chain.get_block_mint_reward(&last.hash)?;

        let mut block = Block::new(BlockType::Primary, last.hash, time, last.number + 1);
        block.mint_tx = Transaction {
            tx_type: TxType::Work,
            fork: genesis,
            timestamp: time,
            nonce: block.number,
            to: *dest,
            amount: reward,
            ..Default::default()
        };
        if let (Some(tid), Some(data)) = (dest.template_id(), self.template_data.as_ref()) {
            if self
                .chain
                .retrieve_template_data(&genesis, &last.hash, tid)
                .is_none()
            {
                block.mint_tx.add_data(TxDataKey::TemplateData, data.clone());
            }
        }
        block.set_proof(BlockProof::HashWork(ProofOfHashWork {
            weight: 0,
            agreement: Hash::zero(),
            algo: POW_ALGO_KECCAK,
            bits: PROOF_OF_WORK_BITS,
            dest_mint: *dest,
            nonce: 0,
        }));

        arrange_block_tx(
            self.chain.as_ref(),
            self.pool.as_ref(),
            &mut block,
            &genesis,
            ed25519_dalek::SIGNATURE_LENGTH,
        )
        .await?;

        Ok(Some(WorkTemplate {
            block,
            prev: last.hash,
            prev_height: last.height,
            bits: PROOF_OF_WORK_BITS,
        }))
    }

    async fn submit_work(&self, block: &Block) -> Result<Hash> {
        if !self.chain.verify_pow_block(block)? {
            return Err(BlockMakerError::Work(format!(
                "block {} does not extend the primary chain",
                block.hash()
            )));
        }
        let update = self.chain.add_new_block(block)?;
        Ok(update.index.hash)
    }
}
