//! Driving ports (Inbound API)

use std::sync::Arc;

use shared_types::{
    Amount, Block, BlockStatus, BlockType, DestState, Destination, ForkProfile, Hash, TemplateId,
    Transaction, TxType,
};

use crate::domain::{BlockIndex, ConsensusResult, DelegateAgreement, DelegateEnrolled};
use crate::params::ConsensusParams;
use crate::ports::{BlockChainUpdate, ForkStatus, StateRootOutcome};

/// Block chain API
///
/// Every block admission runs under one lock; queries may run concurrently
/// with it and observe either the state before or after a commit.
pub trait BlockChainApi: Send + Sync {
    /// Stores the genesis block into an empty container.
    fn insert_genesis_block(&self, block: &Block) -> ConsensusResult<BlockChainUpdate>;

    /// Validates and stores a primary or fork block.
    fn add_new_block(&self, block: &Block) -> ConsensusResult<BlockChainUpdate>;

    /// Validates and stores an origin block, opening a new fork.
    fn add_new_origin(&self, block: &Block) -> ConsensusResult<BlockChainUpdate>;

    /// Checks a proof-of-work block without storing it.
    ///
    /// Returns whether it would make the primary chain longer.
    fn verify_pow_block(&self, block: &Block) -> ConsensusResult<bool>;

    fn genesis_hash(&self) -> Hash;

    fn params(&self) -> Arc<ConsensusParams>;

    fn get_fork_status(&self) -> Vec<ForkStatus>;

    fn list_fork_profiles(&self) -> Vec<(Hash, ForkProfile)>;

    fn get_fork_profile(&self, fork: &Hash) -> Option<ForkProfile>;

    fn get_block_index(&self, hash: &Hash) -> Option<BlockIndex>;

    fn get_block_status(&self, hash: &Hash) -> Option<BlockStatus>;

    fn get_fork_last(&self, fork: &Hash) -> Option<BlockIndex>;

    /// Timestamps of the last `depth` blocks of `fork`, head first.
    fn get_last_block_time(&self, fork: &Hash, depth: usize) -> Vec<u32>;

    fn get_primary_height_block_time(&self, reference: &Hash, height: u32) -> Option<(Hash, u32)>;

    fn get_block_delegate_enrolled(&self, anchor: &Hash) -> ConsensusResult<DelegateEnrolled>;

    /// Agreement proven by stored primary block `hash`.
    fn get_block_delegate_agreement(&self, hash: &Hash) -> ConsensusResult<DelegateAgreement>;

    /// Enrollment the producer of the primary block after `prev` draws from.
    fn get_next_block_enrolled(&self, prev: &Hash) -> ConsensusResult<DelegateEnrolled>;

    fn get_block_locator(&self, fork: &Hash, max: usize) -> Vec<Hash>;

    fn get_block_inv(&self, fork: &Hash, locator: &[Hash], max: usize) -> Vec<Hash>;

    fn verify_checkpoint(&self, fork: &Hash, height: u32, hash: &Hash) -> bool;

    /// Checks local storage against every configured checkpoint it reached.
    fn validate_checkpoints(&self) -> ConsensusResult<()>;

    /// Reward the block after `prev` may mint, without fees.
    fn get_block_mint_reward(&self, prev: &Hash) -> ConsensusResult<Amount>;

    /// Vote reward transactions a block of `block_type` at `height` must
    /// carry first, stamped with `time`.
    fn calc_block_vote_reward_tx(
        &self,
        prev: &Hash,
        block_type: BlockType,
        height: u32,
        time: u32,
    ) -> ConsensusResult<Vec<Transaction>>;

    fn get_next_block_timestamp(&self, prev: &Hash, mint_type: TxType) -> Option<u32>;

    fn get_dpos_timestamp(&self, prev: &Hash) -> Option<u32>;

    fn get_dest_state(&self, fork: &Hash, at: &Hash, dest: &Destination) -> ConsensusResult<DestState>;

    /// Template data already known to the chain at `at`.
    fn retrieve_template_data(&self, fork: &Hash, at: &Hash, tid: &TemplateId) -> Option<Vec<u8>>;

    fn create_block_state_root(&self, fork: &Hash, block: &Block) -> ConsensusResult<StateRootOutcome>;
}
