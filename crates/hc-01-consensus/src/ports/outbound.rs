//! Driven ports (Outbound dependencies)

use std::collections::BTreeMap;

use shared_types::{Amount, Block, DestState, Destination, ForkProfile, Hash, TemplateId, U256};

use crate::domain::{BlockIndex, DayVoteSnapshot, DelegateEnrolled, InviteContext};

/// Result of committing a block to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockChainUpdate {
    pub fork: Hash,
    /// Index of the stored block.
    pub index: BlockIndex,
    /// Head of the fork after the commit.
    pub last: BlockIndex,
    /// Blocks that joined the fork's main branch, oldest first.
    pub added: Vec<Hash>,
    /// Blocks that left it, newest first.
    pub removed: Vec<Hash>,
}

impl BlockChainUpdate {
    /// Whether the stored block became the fork head.
    pub fn is_new_head(&self) -> bool {
        self.last.hash == self.index.hash
    }
}

/// Roots the state engine computes for a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateRootOutcome {
    pub state_root: Hash,
    pub receipts_root: Hash,
    pub gas_used: u64,
}

/// System function addresses resolved from chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionId {
    /// Receives pledge surplus and shaved vote rewards.
    PledgeSurplus,
    /// Receives the foundation share of block rewards.
    Foundation,
}

/// A fork with its profile and head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkStatus {
    pub fork: Hash,
    pub profile: ForkProfile,
    pub last: BlockIndex,
}

/// Block storage and the state engine behind it.
///
/// The container is the only writer of committed chain state. Queries that
/// take an `at` block hash answer against the state after that block.
pub trait BlockContainer: Send + Sync {
    fn is_empty(&self) -> bool;

    fn exists(&self, hash: &Hash) -> bool;

    fn retrieve_index(&self, hash: &Hash) -> Option<BlockIndex>;

    fn retrieve_block(&self, hash: &Hash) -> Option<Block>;

    /// Head of `fork`.
    fn retrieve_fork_last(&self, fork: &Hash) -> Option<BlockIndex>;

    fn retrieve_profile(&self, fork: &Hash) -> Option<ForkProfile>;

    fn list_forks(&self) -> Vec<ForkStatus>;

    /// Commits `block` on `fork` and applies fork choice.
    fn storage_new_block(
        &self,
        fork: &Hash,
        block: &Block,
        block_trust: U256,
        block_reward: Amount,
    ) -> Result<BlockChainUpdate, String>;

    fn retrieve_dest_state(&self, fork: &Hash, at: &Hash, dest: &Destination)
        -> Result<DestState, String>;

    /// Serialized template data known for `tid`.
    fn retrieve_template_data(&self, fork: &Hash, at: &Hash, tid: &TemplateId) -> Option<Vec<u8>>;

    /// Votes counted for `delegate` at primary block `at`.
    fn get_block_delegate_votes(&self, at: &Hash, delegate: &Destination) -> Result<Amount, String>;

    /// Cert transactions `delegate` may still submit after primary block `at`.
    fn get_delegate_cert_tx_count(&self, at: &Hash, delegate: &Destination) -> Result<u32, String>;

    /// Delegates with a cert inside `window` and at least `min_amount`
    /// votes at `anchor`.
    fn retrieve_avail_delegate(
        &self,
        anchor: &Hash,
        window: &[Hash],
        min_amount: Amount,
    ) -> Result<DelegateEnrolled, String>;

    /// Calls `walker` with the vote ledger of every primary height from
    /// `begin` to `tail` inclusive. Stops early when `walker` returns false.
    fn walk_through_day_vote(
        &self,
        begin: &Hash,
        tail: &Hash,
        walker: &mut dyn FnMut(u32, &DayVoteSnapshot) -> bool,
    ) -> Result<(), String>;

    /// Commission ratio of `delegate`, read at primary block `at`.
    fn get_delegate_mint_reward_ratio(&self, at: &Hash, delegate: &Destination)
        -> Result<u32, String>;

    /// Null when the function address is not configured.
    fn retrieve_function_address(&self, at: &Hash, id: FunctionId) -> Destination;

    /// Invite relations of `fork` as of block `at`, keyed by invitee.
    fn list_invite_relation(
        &self,
        fork: &Hash,
        at: &Hash,
    ) -> Result<BTreeMap<Destination, InviteContext>, String>;

    /// Runs the state engine over `block` on top of its previous block.
    fn create_block_state_root(&self, fork: &Hash, block: &Block) -> Result<StateRootOutcome, String>;

    /// Whether primary block `descendant` builds on primary block `ancestor`.
    fn verify_same_chain(&self, ancestor: &Hash, descendant: &Hash) -> bool;

    /// Hash and time of the primary block at `height` on the branch ending
    /// at `reference`.
    fn get_primary_height_block_time(&self, reference: &Hash, height: u32) -> Option<(Hash, u32)>;

    /// Whether the primary main branch has a block at `height` with `time`.
    fn verify_primary_height_ref_block_time(&self, height: u32, time: u32) -> bool;

    fn get_block_locator(&self, fork: &Hash, max: usize) -> Vec<Hash>;

    fn get_block_inv(&self, fork: &Hash, locator: &[Hash], max: usize) -> Vec<Hash>;

    /// Redeem balance of `dest` past its lock period, at `at`.
    fn retrieve_redeem_balance(&self, at: &Hash, dest: &Destination) -> Result<Amount, String>;
}

/// Time source for timestamp validation
pub trait TimeSource: Send + Sync {
    /// Current unix timestamp in seconds
    fn now(&self) -> u32;
}

/// Default time source using system time
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u32 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32
    }
}
