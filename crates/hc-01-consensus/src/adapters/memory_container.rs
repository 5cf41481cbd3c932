//! In-memory block container
//!
//! Implements the BlockContainer port over a [`BlockIndexGraph`] and a full
//! account-state snapshot per block. Suitable for tests and single-process
//! simulations; nothing is persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{
    encode, keccak, keccak_concat, Amount, Block, DestState, Destination, ForkProfile, Hash,
    TemplateId, TemplateType, Transaction, TxDataKey, TxType, U256,
};

use crate::domain::{
    should_adopt, BlockIndex, BlockIndexGraph, DayVoteSnapshot, DelegateEnrolled, DelegateVotes,
    InviteContext, RewardMode, TemplateKind, VoteContext,
};
use crate::params::{ConsensusParams, MINT_REWARD_PER};
use crate::ports::{BlockChainUpdate, BlockContainer, ForkStatus, FunctionId, StateRootOutcome};

/// State after one block.
#[derive(Debug, Clone, Default)]
struct BlockState {
    accounts: BTreeMap<Destination, DestState>,
    /// Redeem credits made by this block.
    redeem_credits: BTreeMap<Destination, Amount>,
    /// Enrollment commitments made by this block, per delegate.
    certs: BTreeMap<Destination, Hash>,
}

impl BlockState {
    fn credit(&mut self, dest: &Destination, amount: Amount) {
        if dest.is_null() || amount.is_zero() {
            return;
        }
        let state = self.accounts.entry(*dest).or_default();
        state.balance = state.balance.saturating_add(amount);
    }

    fn debit(&mut self, dest: &Destination, amount: Amount) -> Result<(), String> {
        let state = self.accounts.entry(*dest).or_default();
        if state.balance < amount {
            return Err(format!("{} overdrawn", dest));
        }
        state.balance -= amount;
        state.nonce += 1;
        Ok(())
    }

    fn apply_tx(&mut self, tx: &Transaction) -> Result<(), String> {
        if !tx.from.is_null() {
            self.debit(&tx.from, tx.amount.saturating_add(tx.fee()))?;
        }
        self.credit(&tx.to, tx.amount);
        if tx.to.is_template_of(TemplateType::Redeem) {
            let credit = self.redeem_credits.entry(tx.to).or_default();
            *credit = credit.saturating_add(tx.amount);
        }
        if tx.tx_type == TxType::Cert {
            if let Some(cert) = tx.cert_data() {
                self.certs.insert(tx.to, cert.commitment);
            }
        }
        Ok(())
    }

    fn state_root(&self) -> Hash {
        keccak(&encode(&self.accounts))
    }
}

#[derive(Default)]
struct ContainerState {
    genesis: Option<Hash>,
    graph: BlockIndexGraph,
    blocks: HashMap<Hash, Block>,
    states: HashMap<Hash, Arc<BlockState>>,
    profiles: HashMap<Hash, ForkProfile>,
    templates: HashMap<TemplateId, Vec<u8>>,
}

impl ContainerState {
    fn template(&self, dest: &Destination) -> Option<TemplateKind> {
        let tid = dest.template_id()?;
        let data = self.templates.get(tid)?;
        TemplateKind::decode_for(tid, data).ok()
    }

    fn state(&self, at: &Hash) -> Result<&Arc<BlockState>, String> {
        self.states
            .get(at)
            .ok_or_else(|| format!("no state for block {:?}", at))
    }

    /// Applies `block` on top of its previous block's state.
    fn next_state(&self, block: &Block) -> Result<BlockState, String> {
        let mut next = if block.block_type.is_origin() {
            BlockState::default()
        } else {
            let prev = self.state(&block.prev)?;
            BlockState {
                accounts: prev.accounts.clone(),
                ..Default::default()
            }
        };
        for tx in &block.txs {
            next.apply_tx(tx)?;
        }
        next.credit(&block.mint_tx.to, block.mint_tx.amount);
        Ok(next)
    }

    fn register_templates(&mut self, tx: &Transaction) {
        let Some(data) = tx.data(TxDataKey::TemplateData) else {
            return;
        };
        for dest in [&tx.to, &tx.from] {
            if let Some(tid) = dest.template_id() {
                if TemplateId::from_data(tid.kind, data) == *tid {
                    self.templates.insert(*tid, data.to_vec());
                }
            }
        }
    }

    fn delegate_votes(&self, at: &Hash, delegate: &Destination) -> Result<Amount, String> {
        let state = self.state(at)?;
        let mut total = Amount::zero();
        for (dest, account) in &state.accounts {
            if !dest.is_template() {
                continue;
            }
            if self.template(dest).and_then(|t| t.voted_delegate()) == Some(*delegate) {
                total = total.saturating_add(account.balance);
            }
        }
        Ok(total)
    }

    fn day_votes(&self, at: &Hash) -> Result<DayVoteSnapshot, String> {
        let state = self.state(at)?;
        let mut snapshot = DayVoteSnapshot::new();
        for (dest, account) in &state.accounts {
            if account.balance.is_zero() {
                continue;
            }
            let Some(kind) = self.template(dest) else {
                continue;
            };
            let (delegate, owner, reward_mode) = match &kind {
                TemplateKind::Vote {
                    delegate,
                    owner,
                    reward_mode,
                } => (*delegate, *owner, *reward_mode),
                TemplateKind::Pledge {
                    delegate, owner, ..
                } => (*delegate, *owner, RewardMode::Owner),
                TemplateKind::Delegate { owner, .. } => (*dest, *owner, RewardMode::Vote),
                _ => continue,
            };
            let votes: &mut DelegateVotes = snapshot.entry(delegate).or_default();
            votes.total = votes.total.saturating_add(account.balance);
            votes.voters.insert(
                *dest,
                VoteContext {
                    vote_amount: account.balance,
                    reward_mode,
                    owner,
                    reward_rate: MINT_REWARD_PER,
                },
            );
        }
        Ok(snapshot)
    }

    fn primary_head(&self) -> Option<&BlockIndex> {
        self.genesis.as_ref().and_then(|g| self.graph.fork_head(g))
    }
}

/// In-memory block container adapter
pub struct InMemoryBlockContainer {
    params: Arc<ConsensusParams>,
    inner: RwLock<ContainerState>,
    function_addresses: RwLock<HashMap<FunctionId, Destination>>,
    /// fork -> invitee -> relation
    invites: RwLock<HashMap<Hash, BTreeMap<Destination, InviteContext>>>,
}

impl InMemoryBlockContainer {
    pub fn new(params: Arc<ConsensusParams>) -> Self {
        Self {
            params,
            inner: RwLock::new(ContainerState::default()),
            function_addresses: RwLock::new(HashMap::new()),
            invites: RwLock::new(HashMap::new()),
        }
    }

    /// Configures a system function address.
    pub fn set_function_address(&self, id: FunctionId, dest: Destination) {
        self.function_addresses.write().insert(id, dest);
    }

    /// Records the invite relation of `sub` on `fork`.
    pub fn set_invite_relation(&self, fork: Hash, sub: Destination, ctx: InviteContext) {
        self.invites.write().entry(fork).or_default().insert(sub, ctx);
    }

    /// Makes template data known without a transaction carrying it.
    pub fn register_template(&self, kind: &TemplateKind) {
        self.inner
            .write()
            .templates
            .insert(kind.template_id(), kind.encode());
    }

    pub fn block_count(&self) -> usize {
        self.inner.read().graph.len()
    }

    /// State root of an origin or genesis block, which starts from empty
    /// state.
    pub fn origin_state_root(block: &Block) -> Hash {
        let mut state = BlockState::default();
        state.credit(&block.mint_tx.to, block.mint_tx.amount);
        state.state_root()
    }
}

impl BlockContainer for InMemoryBlockContainer {
    fn is_empty(&self) -> bool {
        self.inner.read().graph.is_empty()
    }

    fn exists(&self, hash: &Hash) -> bool {
        self.inner.read().graph.contains(hash)
    }

    fn retrieve_index(&self, hash: &Hash) -> Option<BlockIndex> {
        self.inner.read().graph.get(hash).cloned()
    }

    fn retrieve_block(&self, hash: &Hash) -> Option<Block> {
        self.inner.read().blocks.get(hash).cloned()
    }

    fn retrieve_fork_last(&self, fork: &Hash) -> Option<BlockIndex> {
        self.inner.read().graph.fork_head(fork).cloned()
    }

    fn retrieve_profile(&self, fork: &Hash) -> Option<ForkProfile> {
        self.inner.read().profiles.get(fork).cloned()
    }

    fn list_forks(&self) -> Vec<ForkStatus> {
        let st = self.inner.read();
        st.graph
            .forks()
            .filter_map(|(fork, last)| {
                Some(ForkStatus {
                    fork: *fork,
                    profile: st.profiles.get(fork)?.clone(),
                    last: last.clone(),
                })
            })
            .collect()
    }

    fn storage_new_block(
        &self,
        fork: &Hash,
        block: &Block,
        block_trust: U256,
        block_reward: Amount,
    ) -> Result<BlockChainUpdate, String> {
        let mut st = self.inner.write();
        let hash = block.hash();
        if st.graph.contains(&hash) {
            return Err(format!("block {:?} already stored", hash));
        }

        let state = st.next_state(block)?;
        if !block.block_type.is_origin() && state.state_root() != block.state_root {
            return Err(format!("state root mismatch in {:?}", hash));
        }

        let prev = if block.block_type.is_genesis() {
            None
        } else {
            Some(
                st.graph
                    .get(&block.prev)
                    .cloned()
                    .ok_or_else(|| format!("missing prev {:?}", block.prev))?,
            )
        };
        let index = BlockIndex::from_block(block, *fork, prev.as_ref(), block_trust, block_reward);
        st.graph.insert(index.clone())?;

        for tx in block.txs.iter().chain(std::iter::once(&block.mint_tx)) {
            st.register_templates(tx);
        }
        st.blocks.insert(hash, block.clone());
        st.states.insert(hash, Arc::new(state));

        let mut update = BlockChainUpdate {
            fork: *fork,
            index: index.clone(),
            last: index.clone(),
            added: Vec::new(),
            removed: Vec::new(),
        };

        if block.block_type.is_origin() {
            if let Some(profile) = block.profile() {
                st.profiles.insert(hash, profile.clone());
            }
            if block.block_type.is_genesis() {
                st.genesis = Some(hash);
            }
            update.added.push(hash);
            return Ok(update);
        }

        let head = st
            .graph
            .fork_head(fork)
            .cloned()
            .ok_or_else(|| format!("unknown fork {:?}", fork))?;
        let ref_on_main = index.ref_block.is_zero() || st.graph.is_on_main_branch(&index.ref_block);
        let extends_head = st.graph.is_equivalent(&hash, &head.hash);
        if ref_on_main && should_adopt(index.chain_trust, head.chain_trust, extends_head) {
            let change = st.graph.set_fork_head(fork, &hash)?;
            update.added = change.added;
            update.removed = change.removed;
        } else {
            update.last = head;
        }
        Ok(update)
    }

    fn retrieve_dest_state(
        &self,
        _fork: &Hash,
        at: &Hash,
        dest: &Destination,
    ) -> Result<DestState, String> {
        let st = self.inner.read();
        Ok(st.state(at)?.accounts.get(dest).cloned().unwrap_or_default())
    }

    fn retrieve_template_data(&self, _fork: &Hash, _at: &Hash, tid: &TemplateId) -> Option<Vec<u8>> {
        self.inner.read().templates.get(tid).cloned()
    }

    fn get_block_delegate_votes(&self, at: &Hash, delegate: &Destination) -> Result<Amount, String> {
        self.inner.read().delegate_votes(at, delegate)
    }

    fn get_delegate_cert_tx_count(&self, at: &Hash, delegate: &Destination) -> Result<u32, String> {
        let st = self.inner.read();
        let mut used = 0u32;
        for index in st.graph.walk_back(at).take(self.params.enroll_interval as usize) {
            let Some(block) = st.blocks.get(&index.hash) else {
                continue;
            };
            used += block
                .txs
                .iter()
                .filter(|tx| tx.tx_type == TxType::Cert && tx.to == *delegate)
                .count() as u32;
        }
        Ok(self.params.max_cert_tx_count().saturating_sub(used))
    }

    fn retrieve_avail_delegate(
        &self,
        anchor: &Hash,
        window: &[Hash],
        min_amount: Amount,
    ) -> Result<DelegateEnrolled, String> {
        let st = self.inner.read();
        // Newest commitment wins; `window` starts at the anchor.
        let mut commitments: BTreeMap<Destination, Hash> = BTreeMap::new();
        for hash in window {
            for (delegate, commitment) in &st.state(hash)?.certs {
                commitments.entry(*delegate).or_insert(*commitment);
            }
        }

        let mut enrolled = DelegateEnrolled::default();
        for (delegate, commitment) in commitments {
            let votes = st.delegate_votes(anchor, &delegate)?;
            if votes < min_amount {
                continue;
            }
            let unit = self.params.unit_amount.max(U256::one());
            enrolled.weights.insert(delegate, (votes / unit).low_u64());
            enrolled.enroll_data.insert(delegate, commitment);
            enrolled.vote_amounts.push((delegate, votes));
        }
        Ok(enrolled)
    }

    fn walk_through_day_vote(
        &self,
        begin: &Hash,
        tail: &Hash,
        walker: &mut dyn FnMut(u32, &DayVoteSnapshot) -> bool,
    ) -> Result<(), String> {
        let st = self.inner.read();
        let begin_index = st
            .graph
            .get(begin)
            .ok_or_else(|| format!("unknown begin block {:?}", begin))?;
        let mut range: Vec<&BlockIndex> = st
            .graph
            .walk_back(tail)
            .take_while(|i| i.height >= begin_index.height)
            .collect();
        if range.last().map(|i| i.hash) != Some(*begin) {
            return Err("begin is not an ancestor of tail".to_string());
        }
        range.reverse();
        for index in range {
            let snapshot = st.day_votes(&index.hash)?;
            if !walker(index.height, &snapshot) {
                break;
            }
        }
        Ok(())
    }

    fn get_delegate_mint_reward_ratio(
        &self,
        _at: &Hash,
        delegate: &Destination,
    ) -> Result<u32, String> {
        match self.inner.read().template(delegate) {
            Some(TemplateKind::Delegate { reward_ratio, .. }) => Ok(reward_ratio),
            _ => Err(format!("{} is not a known delegate", delegate)),
        }
    }

    fn retrieve_function_address(&self, _at: &Hash, id: FunctionId) -> Destination {
        self.function_addresses
            .read()
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    fn list_invite_relation(
        &self,
        fork: &Hash,
        _at: &Hash,
    ) -> Result<BTreeMap<Destination, InviteContext>, String> {
        Ok(self.invites.read().get(fork).cloned().unwrap_or_default())
    }

    fn create_block_state_root(
        &self,
        _fork: &Hash,
        block: &Block,
    ) -> Result<StateRootOutcome, String> {
        let st = self.inner.read();
        let state = st.next_state(block)?;
        let receipts_root = if block.txs.is_empty() {
            Hash::zero()
        } else {
            let hashes: Vec<Hash> = block.txs.iter().map(Transaction::hash).collect();
            keccak_concat(hashes.iter().map(|h| h.as_bytes()))
        };
        Ok(StateRootOutcome {
            state_root: state.state_root(),
            receipts_root,
            gas_used: block.txs.iter().map(|tx| tx.gas_limit).sum(),
        })
    }

    fn verify_same_chain(&self, ancestor: &Hash, descendant: &Hash) -> bool {
        self.inner.read().graph.is_ancestor(ancestor, descendant)
    }

    fn get_primary_height_block_time(&self, reference: &Hash, height: u32) -> Option<(Hash, u32)> {
        let st = self.inner.read();
        let index = st.graph.ancestor(reference, height)?;
        (index.height == height && index.is_primary()).then_some((index.hash, index.timestamp))
    }

    fn verify_primary_height_ref_block_time(&self, height: u32, time: u32) -> bool {
        let st = self.inner.read();
        let Some(head) = st.primary_head() else {
            return false;
        };
        st.graph
            .ancestor(&head.hash, height)
            .map(|i| i.height == height && i.timestamp == time)
            .unwrap_or(false)
    }

    fn get_block_locator(&self, fork: &Hash, max: usize) -> Vec<Hash> {
        self.inner.read().graph.locator(fork, max)
    }

    fn get_block_inv(&self, fork: &Hash, locator: &[Hash], max: usize) -> Vec<Hash> {
        self.inner.read().graph.inv(fork, locator, max)
    }

    fn retrieve_redeem_balance(&self, at: &Hash, dest: &Destination) -> Result<Amount, String> {
        let st = self.inner.read();
        let balance = st
            .state(at)?
            .accounts
            .get(dest)
            .map(|s| s.balance)
            .unwrap_or_default();
        let lock = self.params.redeem_lock_height() as usize;
        let mut locked = Amount::zero();
        for index in st.graph.walk_back(at).take(lock) {
            if let Some(credit) = st.state(&index.hash)?.redeem_credits.get(dest) {
                locked = locked.saturating_add(*credit);
            }
        }
        Ok(balance.saturating_sub(locked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{coin, BlockProof, BlockType, H256};

    fn owner() -> Destination {
        Destination::PubKey(H256::repeat_byte(1))
    }

    fn create_genesis() -> Block {
        let mut block = Block::new(BlockType::Genesis, Hash::zero(), 1_000, 0);
        let profile = ForkProfile {
            name: "main".into(),
            symbol: "HC".into(),
            amount: coin(100),
            owner: owner(),
            ..Default::default()
        };
        block.mint_tx = Transaction {
            tx_type: TxType::Genesis,
            to: owner(),
            amount: coin(100),
            ..Default::default()
        };
        block.set_proof(BlockProof::Profile(profile));
        block
    }

    fn create_container() -> (InMemoryBlockContainer, Hash) {
        let container = InMemoryBlockContainer::new(Arc::new(ConsensusParams::testnet()));
        let genesis = create_genesis();
        let hash = genesis.hash();
        container
            .storage_new_block(&hash, &genesis, U256::zero(), Amount::zero())
            .unwrap();
        (container, hash)
    }

    fn child(container: &InMemoryBlockContainer, fork: &Hash, prev: &Hash, tag: u8) -> Block {
        let prev_index = container.retrieve_index(prev).unwrap();
        let mut block = Block::new(BlockType::Primary, *prev, prev_index.timestamp + 10, prev_index.number + 1);
        block.mint_tx = Transaction {
            tx_type: TxType::Work,
            to: Destination::PubKey(H256::repeat_byte(tag)),
            amount: coin(1),
            ..Default::default()
        };
        block.state_root = container.create_block_state_root(fork, &block).unwrap().state_root;
        block
    }

    #[test]
    fn test_genesis_opens_fork() {
        let (container, genesis) = create_container();
        assert!(!container.is_empty());
        assert_eq!(container.retrieve_fork_last(&genesis).unwrap().hash, genesis);
        assert_eq!(container.list_forks().len(), 1);
        let state = container
            .retrieve_dest_state(&genesis, &genesis, &owner())
            .unwrap();
        assert_eq!(state.balance, coin(100));
    }

    #[test]
    fn test_heavier_branch_wins() {
        let (container, genesis) = create_container();
        let a = child(&container, &genesis, &genesis, 2);
        let update = container
            .storage_new_block(&genesis, &a, U256::from(5u64), coin(1))
            .unwrap();
        assert!(update.is_new_head());

        let b = child(&container, &genesis, &genesis, 3);
        let update = container
            .storage_new_block(&genesis, &b, U256::from(5u64), coin(1))
            .unwrap();
        assert!(!update.is_new_head());
        assert_eq!(update.last.hash, a.hash());

        let c = child(&container, &genesis, &genesis, 4);
        let update = container
            .storage_new_block(&genesis, &c, U256::from(6u64), coin(1))
            .unwrap();
        assert!(update.is_new_head());
        assert_eq!(update.removed, vec![a.hash()]);
    }

    #[test]
    fn test_state_root_is_checked() {
        let (container, genesis) = create_container();
        let mut block = child(&container, &genesis, &genesis, 2);
        block.state_root = keccak(b"wrong");
        assert!(container
            .storage_new_block(&genesis, &block, U256::one(), coin(1))
            .is_err());
    }

    #[test]
    fn test_delegate_votes_follow_vote_templates() {
        let (container, genesis) = create_container();
        let delegate = TemplateKind::Delegate {
            delegate: H256::repeat_byte(7),
            owner: owner(),
            reward_ratio: 500,
        };
        let vote = TemplateKind::Vote {
            delegate: delegate.destination(),
            owner: owner(),
            reward_mode: RewardMode::Vote,
        };
        container.register_template(&delegate);
        container.register_template(&vote);

        let mut block = child(&container, &genesis, &genesis, 2);
        block.mint_tx.to = vote.destination();
        block.mint_tx.amount = coin(3);
        block.state_root = container
            .create_block_state_root(&genesis, &block)
            .unwrap()
            .state_root;
        let hash = block.hash();
        container
            .storage_new_block(&genesis, &block, U256::one(), coin(3))
            .unwrap();

        assert_eq!(
            container
                .get_block_delegate_votes(&hash, &delegate.destination())
                .unwrap(),
            coin(3)
        );
        assert_eq!(
            container
                .get_delegate_mint_reward_ratio(&hash, &delegate.destination())
                .unwrap(),
            500
        );

        let mut heights = Vec::new();
        container
            .walk_through_day_vote(&genesis, &hash, &mut |h, votes| {
                heights.push((h, votes.len()));
                true
            })
            .unwrap();
        assert_eq!(heights, vec![(0, 0), (1, 1)]);
    }
}
