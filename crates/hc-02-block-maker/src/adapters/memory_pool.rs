//! In-memory transaction pool.
//!
//! Keeps transactions in arrival order and arranges them per sender by
//! nonce against the state at the block's predecessor. Transactions whose
//! nonce the chain already passed are pruned on fetch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hc_01_consensus::BlockChainApi;
use parking_lot::RwLock;
use shared_types::{Destination, Hash, Transaction};

use crate::error::{BlockMakerError, Result};
use crate::ports::TxPool;

pub struct InMemoryTxPool {
    chain: Arc<dyn BlockChainApi>,
    txs: RwLock<Vec<Transaction>>,
}

impl InMemoryTxPool {
    pub fn new(chain: Arc<dyn BlockChainApi>) -> Self {
        Self {
            chain,
            txs: RwLock::new(Vec::new()),
        }
    }

    /// Queues `tx`. Returns false for a duplicate.
    pub fn push(&self, tx: Transaction) -> bool {
        let mut txs = self.txs.write();
        let hash = tx.hash();
        if txs.iter().any(|t| t.hash() == hash) {
            return false;
        }
        txs.push(tx);
        true
    }

    pub fn len(&self) -> usize {
        self.txs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.read().is_empty()
    }
}

#[async_trait]
impl TxPool for InMemoryTxPool {
    async fn fetch_arrange_block_tx(
        &self,
        fork: &Hash,
        prev: &Hash,
        time: u32,
        max_size: usize,
    ) -> Result<Vec<Transaction>> {
        let mut next_nonce: HashMap<Destination, u64> = HashMap::new();
        let mut stale = Vec::new();
        let mut selected = Vec::new();
        let mut size = 0usize;

        {
            let txs = self.txs.read();
            let mut candidates: Vec<&Transaction> = txs
                .iter()
                .filter(|tx| tx.fork == *fork && tx.timestamp <= time)
                .collect();
            candidates.sort_by_key(|tx| tx.nonce);
            for tx in candidates {
                let expected = match next_nonce.get(&tx.from) {
                    Some(nonce) => *nonce,
                    None => {
                        let state = self
                            .chain
                            .get_dest_state(fork, prev, &tx.from)
                            .map_err(|e| BlockMakerError::TxPool(e.to_string()))?;
                        state.nonce.wrapping_add(1)
                    }
                };
                if tx.nonce < expected {
                    stale.push(tx.hash());
                    continue;
                }
                if tx.nonce > expected {
                    next_nonce.insert(tx.from, expected);
                    continue;
                }
                let tx_size = tx.serialized_size();
                if size + tx_size > max_size {
                    next_nonce.insert(tx.from, expected);
                    continue;
                }
                size += tx_size;
                next_nonce.insert(tx.from, expected + 1);
                selected.push(tx.clone());
            }
        }

        if !stale.is_empty() {
            self.txs.write().retain(|tx| !stale.contains(&tx.hash()));
            tracing::debug!("[hc-02] Pruned {} stale txs", stale.len());
        }
        Ok(selected)
    }
}
