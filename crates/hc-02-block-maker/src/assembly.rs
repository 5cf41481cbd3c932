//! Block body assembly shared by every block type the maker produces.

use hc_01_consensus::params::MAX_BLOCK_SIZE;
use hc_01_consensus::BlockChainApi;
use shared_types::{encode, Amount, Block, Hash, TxDataKey};

use crate::error::{BlockMakerError, Result};
use crate::ports::TxPool;

/// Fills `block` with its vote reward transactions and pool transactions,
/// credits the fees to the mint and seals the roots.
///
/// The mint amount on entry is the block reward. Leaves room for a
/// signature of `signature_size` bytes.
pub async fn arrange_block_tx(
    chain: &dyn BlockChainApi,
    pool: &dyn TxPool,
    block: &mut Block,
    fork: &Hash,
    signature_size: usize,
) -> Result<()> {
    let rest = MAX_BLOCK_SIZE
        .saturating_sub(block.serialized_size())
        .saturating_sub(signature_size);

    let reward_txs = chain.calc_block_vote_reward_tx(
        &block.prev,
        block.block_type,
        block.height(),
        block.timestamp,
    )?;
    let reward_size: usize = reward_txs.iter().map(|tx| tx.serialized_size()).sum();
    if reward_size > rest {
        return Err(BlockMakerError::RewardTxOversize {
            size: reward_size,
            available: rest,
        });
    }

    let txs = pool
        .fetch_arrange_block_tx(fork, &block.prev, block.timestamp, rest - reward_size)
        .await?;
    let fees = txs.iter().fold(Amount::zero(), |acc, tx| acc.saturating_add(tx.fee()));

    tracing::debug!(
        "[hc-02] Arranged {} block at {}: {} reward txs, {} pool txs",
        block.block_type.name(),
        block.height(),
        reward_txs.len(),
        txs.len()
    );

    block.txs = reward_txs;
    block.txs.extend(txs);

    let reward = block.mint_tx.amount;
    block.mint_tx.amount = reward.saturating_add(fees);
    block.mint_tx.add_data(TxDataKey::MintCoin, encode(&fees));
    if !block.block_type.is_extended() {
        block.mint_tx.add_data(TxDataKey::MintReward, encode(&reward));
    }

    seal_block(chain, fork, block)
}

/// Sets the merkle, state and receipt roots of `block`.
pub fn seal_block(chain: &dyn BlockChainApi, fork: &Hash, block: &mut Block) -> Result<()> {
    block.merkle_root = block.calc_merkle_root();
    let roots = chain.create_block_state_root(fork, block)?;
    block.state_root = roots.state_root;
    block.receipts_root = roots.receipts_root;
    block.gas_used = roots.gas_used;
    Ok(())
}
