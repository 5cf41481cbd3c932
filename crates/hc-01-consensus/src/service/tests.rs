//! Unit tests for BlockChain service

use super::*;
use crate::adapters::InMemoryBlockContainer;
use crate::domain::{pow_hash_meets_target, DayVoteSnapshot, InviteContext, PublishedShares};
use crate::params::{MIN_GAS_PRICE, PROOF_OF_WORK_BITS};
use ed25519_dalek::SigningKey;
use parking_lot::RwLock;
use shared_types::crypto::{public_key_of, signing_key_from_seed};
use shared_types::{
    coin, encode, keccak, BlockProof, CertData, ProofOfHashWork, TemplateId, POW_ALGO_KECCAK,
};
use std::sync::atomic::{AtomicU64, Ordering};

const GENESIS_TIME: u32 = 1_600_000_000;
const NOW: u32 = GENESIS_TIME + 100_000;

// =============================================================================
// Mock Implementations
// =============================================================================

struct FixedTimeSource(u32);

impl TimeSource for FixedTimeSource {
    fn now(&self) -> u32 {
        self.0
    }
}

/// In-memory container that counts the expensive scans and can forget the
/// templates of chosen forks.
struct MockContainer {
    inner: InMemoryBlockContainer,
    avail_delegate_calls: AtomicU64,
    day_vote_walks: AtomicU64,
    hidden_template_forks: RwLock<HashSet<Hash>>,
}

impl MockContainer {
    fn new(params: Arc<ConsensusParams>) -> Self {
        Self {
            inner: InMemoryBlockContainer::new(params),
            avail_delegate_calls: AtomicU64::new(0),
            day_vote_walks: AtomicU64::new(0),
            hidden_template_forks: RwLock::new(HashSet::new()),
        }
    }

    fn hide_templates_of(&self, fork: Hash) {
        self.hidden_template_forks.write().insert(fork);
    }

    fn avail_delegate_calls(&self) -> u64 {
        self.avail_delegate_calls.load(Ordering::SeqCst)
    }

    fn day_vote_walks(&self) -> u64 {
        self.day_vote_walks.load(Ordering::SeqCst)
    }
}

impl BlockContainer for MockContainer {
    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn exists(&self, hash: &Hash) -> bool {
        self.inner.exists(hash)
    }

    fn retrieve_index(&self, hash: &Hash) -> Option<BlockIndex> {
        self.inner.retrieve_index(hash)
    }

    fn retrieve_block(&self, hash: &Hash) -> Option<Block> {
        self.inner.retrieve_block(hash)
    }

    fn retrieve_fork_last(&self, fork: &Hash) -> Option<BlockIndex> {
        self.inner.retrieve_fork_last(fork)
    }

    fn retrieve_profile(&self, fork: &Hash) -> Option<ForkProfile> {
        self.inner.retrieve_profile(fork)
    }

    fn list_forks(&self) -> Vec<ForkStatus> {
        self.inner.list_forks()
    }

    fn storage_new_block(
        &self,
        fork: &Hash,
        block: &Block,
        block_trust: U256,
        block_reward: Amount,
    ) -> Result<BlockChainUpdate, String> {
        self.inner
            .storage_new_block(fork, block, block_trust, block_reward)
    }

    fn retrieve_dest_state(
        &self,
        fork: &Hash,
        at: &Hash,
        dest: &Destination,
    ) -> Result<DestState, String> {
        self.inner.retrieve_dest_state(fork, at, dest)
    }

    fn retrieve_template_data(&self, fork: &Hash, at: &Hash, tid: &TemplateId) -> Option<Vec<u8>> {
        if self.hidden_template_forks.read().contains(fork) {
            return None;
        }
        self.inner.retrieve_template_data(fork, at, tid)
    }

    fn get_block_delegate_votes(&self, at: &Hash, delegate: &Destination) -> Result<Amount, String> {
        self.inner.get_block_delegate_votes(at, delegate)
    }

    fn get_delegate_cert_tx_count(&self, at: &Hash, delegate: &Destination) -> Result<u32, String> {
        self.inner.get_delegate_cert_tx_count(at, delegate)
    }

    fn retrieve_avail_delegate(
        &self,
        anchor: &Hash,
        window: &[Hash],
        min_amount: Amount,
    ) -> Result<DelegateEnrolled, String> {
        self.avail_delegate_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.retrieve_avail_delegate(anchor, window, min_amount)
    }

    fn walk_through_day_vote(
        &self,
        begin: &Hash,
        tail: &Hash,
        walker: &mut dyn FnMut(u32, &DayVoteSnapshot) -> bool,
    ) -> Result<(), String> {
        self.day_vote_walks.fetch_add(1, Ordering::SeqCst);
        self.inner.walk_through_day_vote(begin, tail, walker)
    }

    fn get_delegate_mint_reward_ratio(
        &self,
        at: &Hash,
        delegate: &Destination,
    ) -> Result<u32, String> {
        self.inner.get_delegate_mint_reward_ratio(at, delegate)
    }

    fn retrieve_function_address(&self, at: &Hash, id: FunctionId) -> Destination {
        self.inner.retrieve_function_address(at, id)
    }

    fn list_invite_relation(
        &self,
        fork: &Hash,
        at: &Hash,
    ) -> Result<BTreeMap<Destination, InviteContext>, String> {
        self.inner.list_invite_relation(fork, at)
    }

    fn create_block_state_root(
        &self,
        fork: &Hash,
        block: &Block,
    ) -> Result<StateRootOutcome, String> {
        self.inner.create_block_state_root(fork, block)
    }

    fn verify_same_chain(&self, ancestor: &Hash, descendant: &Hash) -> bool {
        self.inner.verify_same_chain(ancestor, descendant)
    }

    fn get_primary_height_block_time(&self, reference: &Hash, height: u32) -> Option<(Hash, u32)> {
        self.inner.get_primary_height_block_time(reference, height)
    }

    fn verify_primary_height_ref_block_time(&self, height: u32, time: u32) -> bool {
        self.inner.verify_primary_height_ref_block_time(height, time)
    }

    fn get_block_locator(&self, fork: &Hash, max: usize) -> Vec<Hash> {
        self.inner.get_block_locator(fork, max)
    }

    fn get_block_inv(&self, fork: &Hash, locator: &[Hash], max: usize) -> Vec<Hash> {
        self.inner.get_block_inv(fork, locator, max)
    }

    fn retrieve_redeem_balance(&self, at: &Hash, dest: &Destination) -> Result<Amount, String> {
        self.inner.retrieve_redeem_balance(at, dest)
    }
}

// =============================================================================
// Test Helpers
// =============================================================================

struct TestChain {
    chain: BlockChain<MockContainer>,
    container: Arc<MockContainer>,
    params: Arc<ConsensusParams>,
    genesis: Hash,
    delegate: TemplateKind,
    delegate_key: SigningKey,
    owner_key: SigningKey,
    miner_key: SigningKey,
}

fn secret(height: u32) -> Hash {
    keccak(&height.to_be_bytes())
}

fn create_genesis(owner: Destination) -> Block {
    let mut block = Block::new(BlockType::Genesis, Hash::zero(), GENESIS_TIME, 0);
    block.mint_tx = Transaction {
        tx_type: TxType::Genesis,
        timestamp: GENESIS_TIME,
        to: owner,
        amount: coin(1_000_000),
        ..Default::default()
    };
    block.set_proof(BlockProof::Profile(ForkProfile {
        name: "hybrid".into(),
        symbol: "HC".into(),
        chain_id: 1,
        amount: coin(1_000_000),
        owner,
        ..Default::default()
    }));
    block
}

fn create_test_chain() -> TestChain {
    let params = Arc::new(ConsensusParams::testnet());
    let delegate_key = signing_key_from_seed(&[7u8; 32]);
    let owner_key = signing_key_from_seed(&[8u8; 32]);
    let miner_key = signing_key_from_seed(&[9u8; 32]);
    let delegate = TemplateKind::Delegate {
        delegate: public_key_of(&delegate_key),
        owner: Destination::PubKey(public_key_of(&owner_key)),
        reward_ratio: 500,
    };

    let container = Arc::new(MockContainer::new(params.clone()));
    container.inner.register_template(&delegate);

    let genesis_block = create_genesis(delegate.destination());
    let genesis = genesis_block.hash();
    let chain = BlockChain::new(BlockChainDependencies {
        container: container.clone(),
        params: params.clone(),
        genesis,
    })
    .with_time_source(Box::new(FixedTimeSource(NOW)));
    chain.insert_genesis_block(&genesis_block).unwrap();

    TestChain {
        chain,
        container,
        params,
        genesis,
        delegate,
        delegate_key,
        owner_key,
        miner_key,
    }
}

impl TestChain {
    fn index(&self, hash: &Hash) -> BlockIndex {
        self.chain.get_block_index(hash).unwrap()
    }

    fn cert_tx(&self, nonce: u64, enroll_height: u32) -> Transaction {
        let mut tx = Transaction {
            tx_type: TxType::Cert,
            fork: self.genesis,
            timestamp: GENESIS_TIME,
            nonce,
            from: self.delegate.destination(),
            to: self.delegate.destination(),
            gas_price: U256::from(MIN_GAS_PRICE),
            gas_limit: 100_000,
            ..Default::default()
        };
        let cert = CertData {
            enroll_height,
            commitment: keccak(secret(enroll_height).as_bytes()),
        };
        tx.add_data(TxDataKey::CertData, cert.encode());
        tx.sign(&self.owner_key);
        tx
    }

    /// Leading reward txs, then `txs`; mint pays reward plus fees.
    fn fill_body(&self, block: &mut Block, prev: &BlockIndex, txs: Vec<Transaction>) {
        let mut body = self
            .chain
            .calc_block_vote_reward_tx(&prev.hash, block.block_type, block.height(), block.timestamp)
            .unwrap();
        let fees = txs
            .iter()
            .fold(Amount::zero(), |acc, tx| acc + tx.fee());
        body.extend(txs);
        block.txs = body;
        let reward = if block.block_type.is_vacant() || block.block_type.is_extended() {
            Amount::zero()
        } else {
            self.chain.get_block_mint_reward(&prev.hash).unwrap()
        };
        block.mint_tx.amount = reward + fees;
    }

    fn seal(&self, block: &mut Block, prev: &BlockIndex) {
        block.merkle_root = block.calc_merkle_root();
        let roots = self
            .chain
            .create_block_state_root(&prev.origin, block)
            .unwrap();
        block.state_root = roots.state_root;
        block.receipts_root = roots.receipts_root;
        block.gas_used = roots.gas_used;
    }

    fn mine(&self, prev: &Hash, key: &SigningKey, txs: Vec<Transaction>) -> Block {
        self.mine_block(prev, key, txs, None)
    }

    /// Work block; with `shares` it also carries their delegate proof and
    /// agreement header.
    fn mine_block(
        &self,
        prev: &Hash,
        key: &SigningKey,
        txs: Vec<Transaction>,
        shares: Option<&PublishedShares>,
    ) -> Block {
        let prev = self.index(prev);
        let time = prev.timestamp + self.params.pow_block_spacing;
        let miner = Destination::PubKey(public_key_of(key));
        let mut block = Block::new(BlockType::Primary, prev.hash, time, prev.number + 1);
        block.mint_tx = Transaction {
            tx_type: TxType::Work,
            fork: self.genesis,
            timestamp: time,
            to: miner,
            ..Default::default()
        };
        let header = shares.map(PublishedShares::to_proof).unwrap_or_default();
        block.set_proof(BlockProof::HashWork(ProofOfHashWork {
            weight: header.weight,
            agreement: header.agreement,
            algo: POW_ALGO_KECCAK,
            bits: PROOF_OF_WORK_BITS,
            dest_mint: miner,
            nonce: 0,
        }));
        if shares.is_some() {
            block.set_proof(BlockProof::Delegate(header));
        }
        self.fill_body(&mut block, &prev, txs);
        self.seal(&mut block, &prev);
        while !pow_hash_meets_target(&block.pow_hash(), PROOF_OF_WORK_BITS) {
            if let Some(proof) = block.hash_work_proof_mut() {
                proof.nonce += 1;
            }
        }
        block.sign(key);
        block
    }

    fn delegate_shares(&self, secret_height: u32) -> PublishedShares {
        PublishedShares {
            shares: BTreeMap::from([(self.delegate.destination(), secret(secret_height))]),
        }
    }

    fn stake(&self, prev: &Hash, secret_height: u32) -> Block {
        let prev = self.index(prev);
        let time = prev.timestamp + self.params.block_target_spacing;
        let mut block = Block::new(BlockType::Primary, prev.hash, time, prev.number + 1);
        block.set_proof(BlockProof::Delegate(self.delegate_shares(secret_height).to_proof()));
        block.mint_tx = Transaction {
            tx_type: TxType::Stake,
            fork: self.genesis,
            timestamp: time,
            to: self.delegate.destination(),
            ..Default::default()
        };
        self.fill_body(&mut block, &prev, Vec::new());
        self.seal(&mut block, &prev);
        block.sign(&self.delegate_key);
        block
    }

    /// Proof-of-work blocks 1..=n, each enrolling the delegate.
    fn build_enrolled_chain(&self, n: u32) -> Vec<Hash> {
        let mut hashes = vec![self.genesis];
        for height in 1..=n {
            let prev = *hashes.last().unwrap();
            let block = self.mine(&prev, &self.miner_key, vec![self.cert_tx(height as u64, height)]);
            self.chain.add_new_block(&block).unwrap();
            hashes.push(block.hash());
        }
        hashes
    }

    /// Enrolled chain followed by stake blocks at heights 10, 11 and 12.
    fn build_stake_chain(&self) -> Vec<Hash> {
        let mut hashes = self.build_enrolled_chain(9);
        for secret_height in 6..=8 {
            let block = self.stake(hashes.last().unwrap(), secret_height);
            self.chain.add_new_block(&block).unwrap();
            hashes.push(block.hash());
        }
        hashes
    }

    fn side_profile(&self) -> ForkProfile {
        ForkProfile {
            name: "side".into(),
            symbol: "SD".into(),
            chain_id: 2,
            amount: coin(100),
            mint_reward: coin(1),
            parent: self.genesis,
            owner: Destination::PubKey(public_key_of(&self.owner_key)),
            joint_height: 11,
            ..Default::default()
        }
    }

    /// Origin block at height 11 branching off primary block `on`.
    fn create_origin(&self, on: &Hash, time: u32) -> Block {
        let on = self.index(on);
        let profile = self.side_profile();
        let mut origin = Block::new(BlockType::Origin, on.hash, time, on.number + 1);
        origin.mint_tx = Transaction {
            tx_type: TxType::Genesis,
            timestamp: time,
            to: profile.owner,
            amount: profile.amount,
            ..Default::default()
        };
        origin.set_proof(BlockProof::Profile(profile));
        origin.sign(&self.owner_key);
        origin
    }

    fn piggyback(&self, reference: &Hash) -> ProofOfPiggyback {
        let agreement = self.chain.get_block_delegate_agreement(reference).unwrap();
        ProofOfPiggyback {
            weight: agreement.weight as u8,
            agreement: agreement.agreement,
            ref_block: *reference,
        }
    }

    /// Delegate-minted fork block of `block_type` riding `proof`.
    fn fork_block(&self, block_type: BlockType, prev: &Hash, time: u32, proof: ProofOfPiggyback) -> Block {
        let prev = self.index(prev);
        let mut block = Block::new(block_type, prev.hash, time, prev.number + 1);
        block.set_proof(BlockProof::Piggyback(proof));
        block.mint_tx = Transaction {
            tx_type: TxType::Stake,
            fork: prev.origin,
            timestamp: time,
            to: self.delegate.destination(),
            ..Default::default()
        };
        if !block_type.is_vacant() {
            self.fill_body(&mut block, &prev, Vec::new());
        }
        self.seal(&mut block, &prev);
        block.sign(&self.delegate_key);
        block
    }
}

// =============================================================================
// Genesis and Duplicates
// =============================================================================

#[test]
fn test_genesis_has_zero_trust() {
    let t = create_test_chain();
    let genesis = t.index(&t.genesis);
    assert_eq!(genesis.height, 0);
    assert!(genesis.chain_trust.is_zero());
    assert_eq!(t.chain.get_fork_last(&t.genesis).unwrap().hash, t.genesis);
}

#[test]
fn test_genesis_inserted_once() {
    let t = create_test_chain();
    let genesis = create_genesis(t.delegate.destination());
    assert!(matches!(
        t.chain.insert_genesis_block(&genesis),
        Err(ConsensusError::AlreadyHave(_))
    ));
}

#[test]
fn test_known_block_is_already_have() {
    let t = create_test_chain();
    let block = t.mine(&t.genesis, &t.miner_key, Vec::new());
    t.chain.add_new_block(&block).unwrap();
    let err = t.chain.add_new_block(&block).unwrap_err();
    assert_eq!(err, ConsensusError::AlreadyHave(block.hash()));
    assert!(err.is_benign());
}

// =============================================================================
// Proof of Work and Fork Choice
// =============================================================================

#[test]
fn test_pow_block_extends_primary_chain() {
    let t = create_test_chain();
    let block = t.mine(&t.genesis, &t.miner_key, Vec::new());
    assert!(t.chain.verify_pow_block(&block).unwrap());

    let update = t.chain.add_new_block(&block).unwrap();
    assert!(update.is_new_head());
    let index = t.index(&block.hash());
    assert_eq!(index.height, 1);
    assert!(!index.chain_trust.is_zero());
    assert_eq!(
        index.chain_trust,
        pow_block_trust(1, &block.mint_tx.to)
    );
}

#[test]
fn test_heavier_competing_block_replaces_head() {
    let t = create_test_chain();
    let other_key = signing_key_from_seed(&[10u8; 32]);
    let a = t.mine(&t.genesis, &t.miner_key, Vec::new());
    let b = t.mine(&t.genesis, &other_key, Vec::new());
    let trust_a = pow_block_trust(1, &a.mint_tx.to);
    let trust_b = pow_block_trust(1, &b.mint_tx.to);

    t.chain.add_new_block(&a).unwrap();
    let update = t.chain.add_new_block(&b).unwrap();

    let expected = if trust_b > trust_a { b.hash() } else { a.hash() };
    assert_eq!(update.is_new_head(), trust_b > trust_a);
    assert_eq!(t.chain.get_fork_last(&t.genesis).unwrap().hash, expected);
}

#[test]
fn test_equal_trust_keeps_current_head() {
    let t = create_test_chain();
    let a = t.mine(&t.genesis, &t.miner_key, Vec::new());
    t.chain.add_new_block(&a).unwrap();

    // Same height and mint: same trust, different hash.
    let b = t.mine(&t.genesis, &t.miner_key, vec![t.cert_tx(1, 1)]);
    assert_ne!(a.hash(), b.hash());
    assert!(!t.chain.verify_pow_block(&b).unwrap());
    assert_eq!(t.chain.get_fork_last(&t.genesis).unwrap().hash, a.hash());
}

#[test]
fn test_stake_mint_on_pow_height_rejected() {
    let t = create_test_chain();
    // No enrollment yet: the agreement is empty and only work is accepted.
    let block = t.stake(&t.genesis, 0);
    let err = t.chain.add_new_block(&block).unwrap_err();
    assert!(matches!(err, ConsensusError::BlockProofOfWorkInvalid(_)));
}

// =============================================================================
// Enrollment
// =============================================================================

#[test]
fn test_duplicate_cert_rejected() {
    let t = create_test_chain();
    let block = t.mine(
        &t.genesis,
        &t.miner_key,
        vec![t.cert_tx(1, 5), t.cert_tx(2, 5)],
    );
    let err = t.chain.add_new_block(&block).unwrap_err();
    match err {
        ConsensusError::BlockCertTxOutOfBound(msg) => assert!(msg.contains("duplicate")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_enrolled_snapshot_is_cached() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(9);

    // Too early for a full window: nothing is scanned.
    let early = t.chain.get_block_delegate_enrolled(&hashes[3]).unwrap();
    assert!(early.is_empty());
    assert_eq!(t.container.avail_delegate_calls(), 0);

    let first = t.chain.get_block_delegate_enrolled(&hashes[6]).unwrap();
    assert_eq!(t.container.avail_delegate_calls(), 1);
    assert_eq!(
        first.enroll_data.get(&t.delegate.destination()),
        Some(&keccak(secret(6).as_bytes()))
    );

    // Height 10 draws from the same anchor.
    let next = t.chain.get_next_block_enrolled(&hashes[9]).unwrap();
    assert_eq!(next, first);
    assert_eq!(t.container.avail_delegate_calls(), 1);
    assert!(t.chain.caches().enrolled.stats().hits() >= 1);
}

// =============================================================================
// Delegated Proof of Stake
// =============================================================================

#[test]
fn test_stake_block_minted_by_ballot_leader() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(9);
    let prev = t.index(&hashes[9]);

    let block = t.stake(&hashes[9], 6);
    let update = t.chain.add_new_block(&block).unwrap();
    assert!(update.is_new_head());

    let agreement = t.chain.get_block_delegate_agreement(&block.hash()).unwrap();
    assert!(!agreement.is_proof_of_work());
    assert_eq!(agreement.ballot(0), t.delegate.destination());
    assert_eq!(agreement.weight, 1);

    let index = t.index(&block.hash());
    assert!(index.chain_trust > prev.chain_trust);
}

#[test]
fn test_work_block_with_delegate_ballot_rejected() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(9);
    // A valid opening of height 6 elects the delegate at height 10.
    let shares = t.delegate_shares(6);
    let block = t.mine_block(&hashes[9], &t.miner_key, Vec::new(), Some(&shares));
    assert!(block.delegate_proof().is_some());
    let err = t.chain.add_new_block(&block).unwrap_err();
    assert!(matches!(err, ConsensusError::BlockProofOfStakeInvalid(_)));

    // Without an agreement header the ballot is empty and work is accepted.
    let block = t.mine(&hashes[9], &t.miner_key, Vec::new());
    let update = t.chain.add_new_block(&block).unwrap();
    assert!(update.is_new_head());
    assert!(t.chain.get_block_delegate_agreement(&block.hash()).unwrap().is_proof_of_work());
}

#[test]
fn test_stake_block_with_wrong_secret_rejected() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(9);
    // Opens the commitment of height 5, the window's newest is height 6.
    let block = t.stake(&hashes[9], 5);
    let err = t.chain.add_new_block(&block).unwrap_err();
    assert!(matches!(err, ConsensusError::BlockProofOfStakeInvalid(_)));
}

// =============================================================================
// Vote Rewards
// =============================================================================

#[test]
fn test_vote_reward_tx_is_deterministic() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(9);
    let stake = t.stake(&hashes[9], 6);
    t.chain.add_new_block(&stake).unwrap();
    let prev = stake.hash();

    let first = t
        .chain
        .calc_block_vote_reward_tx(&prev, BlockType::Primary, 11, NOW - 10)
        .unwrap();
    let second = t
        .chain
        .calc_block_vote_reward_tx(&prev, BlockType::Primary, 11, NOW - 10)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(t.container.day_vote_walks(), 1);

    assert_eq!(first.len(), 1);
    let tx = &first[0];
    assert_eq!(tx.tx_type, TxType::VoteReward);
    assert_eq!(tx.to, t.delegate.destination());
    assert_eq!(tx.timestamp, NOW - 10);
    // The delegate template is already known to the chain.
    assert!(tx.data(TxDataKey::TemplateData).is_none());
    // Commission of 5% is not paid out to voters.
    let reward = t.index(&prev).block_reward;
    assert_eq!(tx.amount, reward - reward * U256::from(500u64) / U256::from(10_000u64));
}

#[test]
fn test_block_missing_vote_reward_rejected() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(9);
    let stake = t.stake(&hashes[9], 6);
    t.chain.add_new_block(&stake).unwrap();

    let mut block = t.stake(&stake.hash(), 7);
    assert_eq!(block.txs.len(), 1);
    block.txs.clear();
    let prev = t.index(&stake.hash());
    block.mint_tx.amount = t.chain.get_block_mint_reward(&prev.hash).unwrap();
    t.seal(&mut block, &prev);
    block.sign(&t.delegate_key);
    let err = t.chain.add_new_block(&block).unwrap_err();
    assert!(matches!(err, ConsensusError::TransactionInvalid(_)));

    let good = t.stake(&stake.hash(), 7);
    t.chain.add_new_block(&good).unwrap();
}

#[test]
fn test_pledge_surplus_collects_pow_rewards() {
    let t = create_test_chain();
    let surplus = Destination::PubKey(keccak(b"surplus"));
    t.container
        .inner
        .set_function_address(FunctionId::PledgeSurplus, surplus);
    let hashes = t.build_enrolled_chain(9);
    let stake = t.stake(&hashes[9], 6);
    t.chain.add_new_block(&stake).unwrap();

    let txs = t
        .chain
        .calc_block_vote_reward_tx(&stake.hash(), BlockType::Primary, 11, NOW)
        .unwrap();
    let paid: Vec<&Destination> = txs.iter().map(|tx| &tx.to).collect();
    assert!(paid.contains(&&surplus));
    let pow_total = hashes[1..]
        .iter()
        .fold(Amount::zero(), |acc, h| acc + t.index(h).block_reward);
    let surplus_tx = txs.iter().find(|tx| tx.to == surplus).unwrap();
    assert_eq!(surplus_tx.amount, pow_total);
}

// =============================================================================
// Forks and Vacant Blocks
// =============================================================================

#[test]
fn test_origin_and_vacant_block() {
    let t = create_test_chain();
    let hashes = t.build_stake_chain();
    let (h10, h11, h12) = (hashes[10], hashes[11], hashes[12]);

    let origin = t.create_origin(&h10, t.index(&h11).timestamp);
    let fork = origin.hash();
    t.chain.add_new_origin(&origin).unwrap();
    assert_eq!(t.chain.get_fork_profile(&fork), Some(t.side_profile()));

    // The same name cannot be registered twice.
    let mut twin = origin.clone();
    twin.number += 1;
    twin.sign(&t.owner_key);
    assert!(t.chain.add_new_origin(&twin).is_err());

    let origin_index = t.index(&fork);
    let vacant = t.fork_block(BlockType::Vacant, &fork, t.index(&h12).timestamp, t.piggyback(&h12));
    let update = t.chain.add_new_block(&vacant).unwrap();
    assert_eq!(update.fork, fork);
    assert!(update.is_new_head());
    let index = t.index(&vacant.hash());
    assert_eq!(index.height, 12);
    assert_eq!(index.chain_trust, origin_index.chain_trust);
}

#[test]
fn test_subsidiary_rides_reference_agreement() {
    let t = create_test_chain();
    let hashes = t.build_stake_chain();
    let (h10, h11, h12) = (hashes[10], hashes[11], hashes[12]);
    let origin = t.create_origin(&h10, t.index(&h11).timestamp);
    let fork = origin.hash();
    t.chain.add_new_origin(&origin).unwrap();
    let ref_time = t.index(&h12).timestamp;

    let mut forged = t.piggyback(&h12);
    forged.agreement = keccak(b"other");
    let block = t.fork_block(BlockType::Subsidiary, &fork, ref_time, forged);
    assert!(matches!(
        t.chain.add_new_block(&block),
        Err(ConsensusError::BlockProofOfStakeInvalid(_))
    ));

    let mut heavier = t.piggyback(&h12);
    heavier.weight += 1;
    let block = t.fork_block(BlockType::Subsidiary, &fork, ref_time, heavier);
    assert!(matches!(
        t.chain.add_new_block(&block),
        Err(ConsensusError::BlockProofOfStakeInvalid(_))
    ));

    let subsidiary = t.fork_block(BlockType::Subsidiary, &fork, ref_time, t.piggyback(&h12));
    // The reward walk reaches the origin before a period end.
    assert!(subsidiary.txs.is_empty());
    let update = t.chain.add_new_block(&subsidiary).unwrap();
    assert_eq!(update.fork, fork);
    let index = t.index(&subsidiary.hash());
    assert_eq!(index.height, 12);
    assert_eq!(index.ref_block, h12);
    assert_eq!(index.block_type, BlockType::Subsidiary);
    assert!(index.chain_trust > t.index(&fork).chain_trust);
}

#[test]
fn test_extended_block_within_reference_slot() {
    let t = create_test_chain();
    let hashes = t.build_stake_chain();
    let (h10, h11, h12) = (hashes[10], hashes[11], hashes[12]);
    let origin = t.create_origin(&h10, t.index(&h11).timestamp);
    let fork = origin.hash();
    t.chain.add_new_origin(&origin).unwrap();
    let ref_time = t.index(&h12).timestamp;

    let subsidiary = t.fork_block(BlockType::Subsidiary, &fork, ref_time, t.piggyback(&h12));
    t.chain.add_new_block(&subsidiary).unwrap();

    let late = t.fork_block(
        BlockType::Extended,
        &subsidiary.hash(),
        ref_time + t.params.block_target_spacing,
        t.piggyback(&h12),
    );
    assert!(matches!(
        t.chain.add_new_block(&late),
        Err(ConsensusError::BlockTimestampOutOfRange(_))
    ));

    let extended = t.fork_block(BlockType::Extended, &subsidiary.hash(), ref_time + 1, t.piggyback(&h12));
    assert!(extended.mint_tx.amount.is_zero());
    t.chain.add_new_block(&extended).unwrap();
    let index = t.index(&extended.hash());
    assert_eq!(index.height, 12);
    assert!(index.is_extended());
    assert_eq!(t.chain.get_fork_last(&fork).unwrap().hash, extended.hash());
}

#[test]
fn test_extended_block_needs_minted_prev() {
    let t = create_test_chain();
    let hashes = t.build_stake_chain();
    let (h10, h11, h12) = (hashes[10], hashes[11], hashes[12]);
    let origin = t.create_origin(&h10, t.index(&h11).timestamp);
    let fork = origin.hash();
    t.chain.add_new_origin(&origin).unwrap();
    let ref_time = t.index(&h12).timestamp;

    let on_origin = t.fork_block(BlockType::Extended, &fork, ref_time + 1, t.piggyback(&h12));
    assert!(matches!(
        t.chain.add_new_block(&on_origin),
        Err(ConsensusError::MissingPrev(_))
    ));

    let vacant = t.fork_block(BlockType::Vacant, &fork, ref_time, t.piggyback(&h12));
    t.chain.add_new_block(&vacant).unwrap();
    let on_vacant = t.fork_block(BlockType::Extended, &vacant.hash(), ref_time + 1, t.piggyback(&h12));
    assert!(matches!(
        t.chain.add_new_block(&on_vacant),
        Err(ConsensusError::MissingPrev(_))
    ));
}

#[test]
fn test_fork_reward_requires_reference_minter() {
    let t = create_test_chain();
    let hashes = t.build_stake_chain();
    let (h10, h11, h12) = (hashes[10], hashes[11], hashes[12]);
    let origin = t.create_origin(&h10, t.index(&h11).timestamp);
    let fork = origin.hash();
    t.chain.add_new_origin(&origin).unwrap();
    let subsidiary = t.fork_block(BlockType::Subsidiary, &fork, t.index(&h12).timestamp, t.piggyback(&h12));
    t.chain.add_new_block(&subsidiary).unwrap();

    let index = t.index(&subsidiary.hash());
    assert_eq!(t.chain.reward_primary_of(&index).unwrap(), h12);
    assert_eq!(t.chain.reward_primary_of(&t.index(&h12)).unwrap(), h12);

    let mut forged = index.clone();
    forged.dest_mint = Destination::PubKey(public_key_of(&t.miner_key));
    assert!(matches!(
        t.chain.reward_primary_of(&forged),
        Err(ConsensusError::BlockTransactionsInvalid(_))
    ));
}

#[test]
fn test_reward_template_data_only_when_unknown() {
    let t = create_test_chain();
    let hashes = t.build_stake_chain();
    let (h10, h11, h12) = (hashes[10], hashes[11], hashes[12]);
    let origin = t.create_origin(&h10, t.index(&h11).timestamp);
    let fork = origin.hash();
    t.chain.add_new_origin(&origin).unwrap();
    let subsidiary = t.fork_block(BlockType::Subsidiary, &fork, t.index(&h12).timestamp, t.piggyback(&h12));
    t.chain.add_new_block(&subsidiary).unwrap();
    let delegate = t.delegate.destination();
    let sub_index = t.index(&subsidiary.hash());

    // Known on both chains: nothing is attached.
    assert_eq!(t.chain.reward_template_data(&t.index(&h12), &delegate).unwrap(), None);
    assert_eq!(t.chain.reward_template_data(&sub_index, &delegate).unwrap(), None);
    let plain = Destination::PubKey(keccak(b"voter"));
    assert_eq!(t.chain.reward_template_data(&sub_index, &plain).unwrap(), None);

    // Unknown on the fork: the data comes from the primary chain.
    t.container.hide_templates_of(fork);
    assert_eq!(
        t.chain.reward_template_data(&sub_index, &delegate).unwrap(),
        Some(t.delegate.encode())
    );

    // Unknown on the primary chain itself.
    t.container.hide_templates_of(t.genesis);
    assert!(matches!(
        t.chain.reward_template_data(&t.index(&h12), &delegate),
        Err(ConsensusError::StorageError(_))
    ));
}

#[test]
fn test_invite_reward_merged_into_period_payout() {
    let t = create_test_chain();
    let inviter = Destination::PubKey(keccak(b"inviter"));
    let invitee = Destination::PubKey(keccak(b"invitee"));
    let inviter_reward = Destination::PubKey(keccak(b"inviter reward"));
    t.container.inner.set_invite_relation(
        t.genesis,
        inviter,
        InviteContext {
            parent: Destination::Null,
            reward: inviter_reward,
            vote_amount: coin(80),
        },
    );
    t.container.inner.set_invite_relation(
        t.genesis,
        invitee,
        InviteContext {
            parent: inviter,
            reward: invitee,
            vote_amount: coin(60),
        },
    );
    let hashes = t.build_enrolled_chain(9);
    let stake = t.stake(&hashes[9], 6);
    t.chain.add_new_block(&stake).unwrap();

    let txs = t
        .chain
        .calc_block_vote_reward_tx(&stake.hash(), BlockType::Primary, 11, NOW)
        .unwrap();
    let invite_tx = txs.iter().find(|tx| tx.to == inviter_reward).unwrap();
    // The only inviter takes every mint reward of the period.
    let minted = hashes[1..]
        .iter()
        .chain(std::iter::once(&stake.hash()))
        .fold(Amount::zero(), |acc, h| acc + t.index(h).mint_reward);
    assert_eq!(invite_tx.amount, minted);
    assert_eq!(invite_tx.data(TxDataKey::VoteReward), Some(&encode(&Amount::zero())[..]));
    assert!(txs.iter().all(|tx| tx.to != invitee));
}

#[test]
fn test_vacant_on_primary_rejected() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(2);
    let prev = t.index(&hashes[2]);
    let mut vacant = Block::new(BlockType::Vacant, prev.hash, prev.timestamp + 10, prev.number + 1);
    vacant.set_proof(BlockProof::Piggyback(ProofOfPiggyback {
        weight: 1,
        agreement: keccak(b"a"),
        ref_block: prev.hash,
    }));
    vacant.mint_tx = Transaction {
        tx_type: TxType::Stake,
        timestamp: prev.timestamp + 10,
        to: t.delegate.destination(),
        ..Default::default()
    };
    t.seal(&mut vacant, &prev);
    vacant.sign(&t.delegate_key);
    let err = t.chain.add_new_block(&vacant).unwrap_err();
    assert!(matches!(err, ConsensusError::BlockInvalidFork(_)));
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_last_block_time_and_status() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(3);
    let times = t.chain.get_last_block_time(&t.genesis, 10);
    assert_eq!(
        times,
        vec![GENESIS_TIME + 30, GENESIS_TIME + 20, GENESIS_TIME + 10, GENESIS_TIME]
    );

    let status = t.chain.get_block_status(&hashes[2]).unwrap();
    assert_eq!(status.height, 2);
    assert_eq!(status.mint_type, Some(TxType::Work));
    assert!(status.is_primary);

    assert_eq!(
        t.chain.get_next_block_timestamp(&hashes[3], TxType::Work),
        Some(GENESIS_TIME + 40)
    );
    let locator = t.chain.get_block_locator(&t.genesis, 8);
    assert_eq!(locator.first(), Some(&hashes[3]));
    let inv = t.chain.get_block_inv(&t.genesis, &[hashes[1]], 10);
    assert_eq!(inv, vec![hashes[2], hashes[3]]);
}

#[test]
fn test_checkpoints_validated_against_storage() {
    let t = create_test_chain();
    let hashes = t.build_enrolled_chain(2);
    assert!(t.chain.validate_checkpoints().is_ok());
    assert!(t.chain.verify_checkpoint(&t.genesis, 1, &hashes[1]));

    let mut params = ConsensusParams::testnet();
    params.checkpoints.push(crate::params::Checkpoint {
        fork: t.genesis,
        height: 1,
        hash: keccak(b"other"),
    });
    let chain = BlockChain::new(BlockChainDependencies {
        container: t.container.clone(),
        params: Arc::new(params),
        genesis: t.genesis,
    });
    assert!(matches!(
        chain.validate_checkpoints(),
        Err(ConsensusError::BlockCheckpointMismatch { height: 1, .. })
    ));
    assert!(!chain.verify_checkpoint(&t.genesis, 1, &hashes[1]));
}

#[test]
fn test_redeem_spend_limited_to_matured_balance() {
    let t = create_test_chain();
    let redeem = TemplateKind::Redeem {
        owner: Destination::PubKey(public_key_of(&t.owner_key)),
    };
    t.container.inner.register_template(&redeem);
    let hashes = t.build_enrolled_chain(1);
    let prev = t.index(&hashes[1]);
    // Nothing was ever credited to the redeem template.
    let spend = Transaction {
        tx_type: TxType::Token,
        fork: t.genesis,
        from: redeem.destination(),
        to: Destination::PubKey(public_key_of(&t.owner_key)),
        amount: coin(1),
        ..Default::default()
    };
    let block = Block {
        txs: vec![spend],
        ..Block::new(BlockType::Primary, prev.hash, prev.timestamp + 10, prev.number + 1)
    };
    assert!(matches!(
        t.chain.verify_vote_redeem_tx(&block, &prev),
        Err(ConsensusError::TransactionInputInvalid(_))
    ));
}
