//! Block chain service
//!
//! Admits blocks into the container after running the full block-type state
//! machine, and answers the consensus queries the block maker and the sync
//! layer need. One admission runs at a time; all derived data lives in the
//! caches of [`ConsensusCaches`].

use std::collections::btree_map::Entry as BTreeEntry;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{
    Amount, Block, BlockStatus, BlockType, DestState, Destination, ForkProfile, Hash,
    ProofOfDelegate, ProofOfPiggyback, TemplateId, TemplateType, Transaction, TxDataKey, TxType,
    U256,
};

use crate::domain::{
    aggregate_rewards, block_reward_for, build_reward_batches, calc_invite_reward, distribute_height,
    get_delegated_ballot, is_better_chain, max_block_reward_tx_count, pow_block_trust, BlockIndex,
    CalcBlock, ConsensusError, ConsensusResult, CoreProtocol, DelegateAgreement, DelegateEnrolled,
    DelegateVerify, RewardDistribution, TemplateKind, TrustSource, TxContext,
};
use crate::metrics;
use crate::params::ConsensusParams;
use crate::ports::{
    BlockChainApi, BlockChainUpdate, BlockContainer, ForkStatus, FunctionId, StateRootOutcome,
    SystemTimeSource, TimeSource,
};
use crate::state::{ConsensusCaches, RewardBatches};

#[cfg(test)]
mod tests;

/// Dependencies for BlockChain
pub struct BlockChainDependencies<C> {
    pub container: Arc<C>,
    pub params: Arc<ConsensusParams>,
    /// Hash of the network's genesis block.
    pub genesis: Hash,
}

/// Trust input resolved while verifying a block.
enum BlockTrust {
    None,
    Stake(U256),
    Work,
    Reference(BlockIndex, Option<BlockIndex>),
}

impl BlockTrust {
    fn source(&self) -> TrustSource<'_> {
        match self {
            BlockTrust::None => TrustSource::None,
            BlockTrust::Stake(trust) => TrustSource::Stake(*trust),
            BlockTrust::Work => TrustSource::Work,
            BlockTrust::Reference(reference, reference_prev) => TrustSource::Reference {
                reference,
                reference_prev: reference_prev.as_ref(),
            },
        }
    }
}

/// Block chain service
pub struct BlockChain<C: BlockContainer> {
    container: Arc<C>,
    params: Arc<ConsensusParams>,
    core: CoreProtocol,
    caches: ConsensusCaches,
    /// Serializes block admission.
    add_lock: Mutex<()>,
    max_reward_tx_count: usize,
    time_source: Box<dyn TimeSource>,
}

impl<C: BlockContainer> BlockChain<C> {
    pub fn new(deps: BlockChainDependencies<C>) -> Self {
        Self {
            container: deps.container,
            core: CoreProtocol::new(deps.params.clone(), deps.genesis),
            params: deps.params,
            caches: ConsensusCaches::new(),
            add_lock: Mutex::new(()),
            max_reward_tx_count: max_block_reward_tx_count(),
            time_source: Box::new(SystemTimeSource),
        }
    }

    /// Set custom time source (for testing)
    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn container(&self) -> &Arc<C> {
        &self.container
    }

    pub fn core(&self) -> &CoreProtocol {
        &self.core
    }

    pub fn caches(&self) -> &ConsensusCaches {
        &self.caches
    }

    fn params_ref(&self) -> &ConsensusParams {
        &self.params
    }

    // === STORAGE HELPERS ===

    fn index(&self, hash: &Hash) -> ConsensusResult<BlockIndex> {
        self.container
            .retrieve_index(hash)
            .ok_or_else(|| ConsensusError::StorageError(format!("no index for {:?}", hash)))
    }

    fn block(&self, hash: &Hash) -> ConsensusResult<Block> {
        self.container
            .retrieve_block(hash)
            .ok_or_else(|| ConsensusError::StorageError(format!("no block {:?}", hash)))
    }

    /// The block `n` steps back from `from`.
    fn ancestor_back(&self, from: &BlockIndex, n: u32) -> ConsensusResult<BlockIndex> {
        let mut index = from.clone();
        for _ in 0..n {
            index = self.index(&index.prev)?;
        }
        Ok(index)
    }

    /// Block on the main branch of `fork` at `height`, the last one when
    /// several share it.
    fn main_branch_at(&self, fork: &Hash, height: u32) -> ConsensusResult<Option<BlockIndex>> {
        let Some(mut index) = self.container.retrieve_fork_last(fork) else {
            return Ok(None);
        };
        while index.height > height {
            if index.is_origin() {
                return Ok(None);
            }
            index = self.index(&index.prev)?;
        }
        Ok((index.height == height && index.origin == *fork).then_some(index))
    }

    fn piggyback_of(&self, index: &BlockIndex) -> ConsensusResult<ProofOfPiggyback> {
        if let Some(proof) = self.caches.piggyback.get(&index.hash) {
            return Ok(proof);
        }
        let block = self.block(&index.hash)?;
        let proof = block.piggyback_proof().cloned().ok_or_else(|| {
            ConsensusError::BlockFormatInvalid(format!(
                "{} block without piggyback proof",
                index.block_type.name()
            ))
        })?;
        self.caches.piggyback.put(index.hash, proof.clone());
        Ok(proof)
    }

    /// Template behind `dest`, from the container or from the transaction's
    /// own attachment.
    fn resolve_template(
        &self,
        fork: &Hash,
        at: &Hash,
        dest: &Destination,
        tx: &Transaction,
    ) -> ConsensusResult<Option<TemplateKind>> {
        let Some(tid) = dest.template_id() else {
            return Ok(None);
        };
        if let Some(data) = self.container.retrieve_template_data(fork, at, tid) {
            return TemplateKind::decode_for(tid, &data).map(Some);
        }
        Ok(tx
            .data(TxDataKey::TemplateData)
            .and_then(|data| TemplateKind::decode_for(tid, data).ok()))
    }

    // === ENROLLMENT AND AGREEMENT ===

    fn enrolled_at(&self, anchor: &BlockIndex) -> ConsensusResult<DelegateEnrolled> {
        if let Some(enrolled) = self.caches.enrolled.get(&anchor.hash) {
            return Ok(enrolled);
        }
        let params = self.params_ref();
        if anchor.height < params.enroll_interval {
            return Ok(DelegateEnrolled::default());
        }

        let mut window = Vec::with_capacity(params.enroll_interval as usize);
        let mut index = anchor.clone();
        loop {
            window.push(index.hash);
            if window.len() >= params.enroll_interval as usize || index.prev.is_zero() {
                break;
            }
            index = self.index(&index.prev)?;
        }

        let enrolled = self
            .container
            .retrieve_avail_delegate(&anchor.hash, &window, params.enroll_minimum_amount)
            .map_err(ConsensusError::StorageError)?;
        tracing::debug!(
            "[hc-01] Enrolled {} delegates at anchor {:?}",
            enrolled.enroll_data.len(),
            anchor.hash
        );
        self.caches.enrolled.put(anchor.hash, enrolled.clone());
        Ok(enrolled)
    }

    fn agreement_from_proof(
        &self,
        proof: &ProofOfDelegate,
        enrolled: &DelegateEnrolled,
    ) -> ConsensusResult<(DelegateAgreement, Amount)> {
        let verified = DelegateVerify::new(enrolled)
            .verify_proof(proof)
            .map_err(ConsensusError::BlockProofOfStakeInvalid)?;
        let (ballot, enroll_trust) = get_delegated_ballot(
            self.params_ref(),
            &verified.agreement,
            &verified.ballot_set,
            &enrolled.vote_amounts,
        );
        let agreement = DelegateAgreement {
            agreement: verified.agreement,
            weight: verified.weight,
            ballot,
        };
        Ok((agreement, enroll_trust))
    }

    /// Delegate proof a primary block is judged by. Work blocks carry the
    /// agreement header inside their hash-work proof.
    fn agreement_header(block: &Block) -> ConsensusResult<ProofOfDelegate> {
        match (block.delegate_proof(), block.hash_work_proof()) {
            (Some(delegate), Some(work))
                if delegate.weight != work.weight || delegate.agreement != work.agreement =>
            {
                Err(ConsensusError::BlockProofOfStakeInvalid(
                    "hash-work header disagrees with the delegate proof".to_string(),
                ))
            }
            (Some(delegate), _) => Ok(delegate.clone()),
            (None, Some(work)) => Ok(ProofOfDelegate {
                weight: work.weight,
                agreement: work.agreement,
                published: Vec::new(),
            }),
            (None, None) => Err(ConsensusError::BlockProofOfStakeInvalid(
                "primary block without agreement header".to_string(),
            )),
        }
    }

    /// Agreement of a primary block about to follow `prev`, with its enroll
    /// trust.
    fn new_block_agreement(
        &self,
        block: &Block,
        prev: &BlockIndex,
    ) -> ConsensusResult<(DelegateAgreement, Amount)> {
        let params = self.params_ref();
        if prev.height + 1 < params.consensus_interval() {
            return Ok((DelegateAgreement::default(), Amount::zero()));
        }
        let anchor = self.ancestor_back(prev, params.distribute_interval)?;
        let enrolled = self.enrolled_at(&anchor)?;
        let proof = Self::agreement_header(block)?;
        self.agreement_from_proof(&proof, &enrolled)
    }

    // === VERIFICATION ===

    fn verify_block(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<(Amount, BlockTrust)> {
        match block.block_type {
            BlockType::Genesis | BlockType::Origin => Err(ConsensusError::BlockInvalidFork(
                "origin blocks are admitted separately".to_string(),
            )),
            BlockType::Primary => self.verify_primary(block, prev),
            BlockType::Subsidiary | BlockType::Extended => self.verify_fork_block(block, prev),
            BlockType::Vacant => self.verify_vacant(block, prev),
        }
    }

    fn verify_primary(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<(Amount, BlockTrust)> {
        if !prev.is_primary() {
            return Err(ConsensusError::BlockInvalidFork(
                "primary block on a non-primary previous block".to_string(),
            ));
        }
        self.verify_block_cert_tx(block, prev)?;

        let (agreement, enroll_trust) = self.new_block_agreement(block, prev)?;
        let reward = self
            .get_block_mint_reward(&prev.hash)
            .map_err(|e| ConsensusError::BlockCoinbaseInvalid(e.to_string()))?;

        let work_mint = block.mint_tx.tx_type == TxType::Work;
        match (agreement.is_proof_of_work(), work_mint) {
            (true, true) => {
                self.core.verify_proof_of_work(block, prev)?;
                Ok((reward, BlockTrust::Work))
            }
            (false, false) => {
                self.core.verify_dpos(block, prev, &agreement)?;
                Ok((reward, BlockTrust::Stake(enroll_trust)))
            }
            (true, false) => Err(ConsensusError::BlockProofOfWorkInvalid(format!(
                "stake mint at height {} without a delegate ballot",
                block.height()
            ))),
            (false, true) => Err(ConsensusError::BlockProofOfStakeInvalid(format!(
                "work mint at height {} with a delegate ballot",
                block.height()
            ))),
        }
    }

    /// Piggyback proof of a fork block checked against the agreement of its
    /// reference block. Returns the proof, the agreement and the reference.
    fn verify_piggyback(
        &self,
        block: &Block,
    ) -> ConsensusResult<(ProofOfPiggyback, DelegateAgreement, BlockIndex)> {
        let proof = block.piggyback_proof().cloned().ok_or_else(|| {
            ConsensusError::BlockFormatInvalid("fork block without piggyback proof".to_string())
        })?;
        if proof.ref_block.is_zero() {
            return Err(ConsensusError::BlockInvalidFork(
                "piggyback proof without reference block".to_string(),
            ));
        }
        let agreement = self.get_block_delegate_agreement(&proof.ref_block)?;
        if agreement.agreement != proof.agreement
            || agreement.weight != usize::from(proof.weight)
            || agreement.is_proof_of_work()
        {
            return Err(ConsensusError::BlockProofOfStakeInvalid(format!(
                "piggyback agreement differs from reference {:?}",
                proof.ref_block
            )));
        }
        let reference = self.index(&proof.ref_block)?;
        if !reference.is_primary() {
            return Err(ConsensusError::BlockInvalidFork(
                "reference block is not primary".to_string(),
            ));
        }
        Ok((proof, agreement, reference))
    }

    /// A fork block must reference the same primary chain as its previous
    /// block.
    fn verify_reference_continuity(&self, prev: &BlockIndex, ref_block: &Hash) -> ConsensusResult<()> {
        if prev.is_origin() {
            return Ok(());
        }
        let prev_proof = self.piggyback_of(prev)?;
        if prev_proof.ref_block != *ref_block
            && !self.container.verify_same_chain(&prev_proof.ref_block, ref_block)
        {
            return Err(ConsensusError::BlockInvalidFork(format!(
                "reference {:?} is not on the chain of {:?}",
                ref_block, prev_proof.ref_block
            )));
        }
        Ok(())
    }

    fn verify_fork_block(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<(Amount, BlockTrust)> {
        if prev.is_primary() {
            return Err(ConsensusError::BlockInvalidFork(format!(
                "{} block on a primary previous block",
                block.block_type.name()
            )));
        }
        let (proof, agreement, reference) = self.verify_piggyback(block)?;
        self.verify_reference_continuity(prev, &proof.ref_block)?;

        let reward = if block.block_type.is_extended() {
            if prev.is_origin() || prev.is_vacant() {
                return Err(ConsensusError::MissingPrev(
                    "extended block must follow a subsidiary or extended block".to_string(),
                ));
            }
            let prev_proof = self.piggyback_of(prev)?;
            if prev_proof.agreement != proof.agreement || prev_proof.weight != proof.weight {
                return Err(ConsensusError::BlockProofOfStakeInvalid(
                    "extended block changes the agreement".to_string(),
                ));
            }
            Amount::zero()
        } else {
            self.get_block_mint_reward(&prev.hash)
                .map_err(|e| ConsensusError::BlockCoinbaseInvalid(e.to_string()))?
        };

        self.core.verify_subsidiary(block, prev, &reference, &agreement)?;
        let reference_prev = self.container.retrieve_index(&reference.prev);
        Ok((reward, BlockTrust::Reference(reference, reference_prev)))
    }

    fn verify_vacant(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<(Amount, BlockTrust)> {
        if prev.is_primary() {
            return Err(ConsensusError::BlockInvalidFork(
                "vacant block on a primary previous block".to_string(),
            ));
        }
        let (proof, agreement, _reference) = self.verify_piggyback(block)?;
        if block.mint_tx.to != agreement.ballot(0) {
            return Err(ConsensusError::BlockProofOfStakeInvalid(
                "vacant block not minted by the ballot leader".to_string(),
            ));
        }
        if block.mint_tx.timestamp != block.timestamp {
            return Err(ConsensusError::BlockTimestampOutOfRange(
                "vacant mint time differs from block time".to_string(),
            ));
        }
        self.verify_reference_continuity(prev, &proof.ref_block)?;

        let height = block.height();
        if !self
            .container
            .verify_primary_height_ref_block_time(height, block.timestamp)
        {
            match self
                .container
                .get_primary_height_block_time(&proof.ref_block, height)
            {
                Some((_, time)) if time == block.timestamp => {}
                _ => {
                    return Err(ConsensusError::BlockTimestampOutOfRange(format!(
                        "vacant block at height {} is not aligned with the primary chain",
                        height
                    )))
                }
            }
        }
        Ok((Amount::zero(), BlockTrust::None))
    }

    /// CERT transactions of a primary block.
    fn verify_block_cert_tx(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<()> {
        let params = self.params_ref();
        let mut seen = HashSet::new();
        let mut counts: BTreeMap<Destination, u32> = BTreeMap::new();
        for tx in block.txs.iter().filter(|tx| tx.tx_type == TxType::Cert) {
            let cert = tx.cert_data().ok_or_else(|| {
                ConsensusError::BlockCertTxOutOfBound("cert tx without cert data".to_string())
            })?;
            if !seen.insert((tx.to, cert.enroll_height)) {
                return Err(ConsensusError::BlockCertTxOutOfBound(format!(
                    "duplicate cert of {} for height {}",
                    tx.to, cert.enroll_height
                )));
            }
            let votes = self
                .container
                .get_block_delegate_votes(&prev.hash, &tx.to)
                .map_err(ConsensusError::StorageError)?;
            if votes < params.enroll_minimum_amount {
                return Err(ConsensusError::BlockCertTxOutOfBound(format!(
                    "{} has {} votes, below the enroll minimum",
                    tx.to, votes
                )));
            }
            *counts.entry(tx.to).or_default() += 1;
        }
        for (delegate, count) in counts {
            let available = self
                .container
                .get_delegate_cert_tx_count(&prev.hash, &delegate)
                .map_err(ConsensusError::StorageError)?;
            if count > available {
                return Err(ConsensusError::BlockCertTxOutOfBound(format!(
                    "{} sent {} certs, {} available",
                    delegate, count, available
                )));
            }
        }
        Ok(())
    }

    /// Leading reward transactions must equal the computed batch. Returns
    /// their count.
    fn verify_vote_reward_tx(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<usize> {
        let expected = self.calc_block_vote_reward_tx(
            &prev.hash,
            block.block_type,
            block.height(),
            block.timestamp,
        )?;
        let count = expected.len();
        if block.txs.len() < count || block.txs[..count] != expected[..] {
            return Err(ConsensusError::TransactionInvalid(format!(
                "block does not lead with the {} expected vote reward txs",
                count
            )));
        }
        Ok(count)
    }

    fn verify_block_tx(
        &self,
        block: &Block,
        prev: &BlockIndex,
        reward: Amount,
        reward_tx_count: usize,
    ) -> ConsensusResult<()> {
        let fork = prev.origin;
        let mut states: HashMap<Destination, DestState> = HashMap::new();
        let mut total_fee = Amount::zero();

        for (i, tx) in block.txs.iter().enumerate() {
            if tx.fork != fork {
                return Err(ConsensusError::TransactionInvalid(format!(
                    "tx {:?} belongs to another fork",
                    tx.hash()
                )));
            }
            if i < reward_tx_count {
                let to = self.dest_state(&mut states, &fork, &prev.hash, &tx.to)?;
                to.balance = to.balance.saturating_add(tx.amount);
                continue;
            }
            if tx.tx_type.is_reward() {
                return Err(ConsensusError::TransactionInvalid(
                    "unexpected vote reward tx".to_string(),
                ));
            }
            if tx.timestamp > block.timestamp {
                return Err(ConsensusError::BlockTimestampOutOfRange(format!(
                    "tx {:?} is newer than its block",
                    tx.hash()
                )));
            }
            if tx.from.is_null() {
                return Err(ConsensusError::TransactionInputInvalid(
                    "transfer without sender".to_string(),
                ));
            }

            let from_state = self.dest_state(&mut states, &fork, &prev.hash, &tx.from)?.clone();
            let from_template = self.resolve_template(&fork, &prev.hash, &tx.from, tx)?;
            let to_template = self.resolve_template(&fork, &prev.hash, &tx.to, tx)?;
            self.core.verify_transaction(
                tx,
                &TxContext {
                    fork: &fork,
                    from_state: &from_state,
                    from_template: from_template.as_ref(),
                    to_template: to_template.as_ref(),
                },
            )?;

            let fee = tx.fee();
            let from = self.dest_state(&mut states, &fork, &prev.hash, &tx.from)?;
            from.balance -= tx.amount.saturating_add(fee);
            from.nonce += 1;
            let to = self.dest_state(&mut states, &fork, &prev.hash, &tx.to)?;
            to.balance = to.balance.saturating_add(tx.amount);
            total_fee = total_fee.saturating_add(fee);
        }

        if block.mint_tx.amount > total_fee.saturating_add(reward) {
            return Err(ConsensusError::BlockTransactionsInvalid(format!(
                "mint {} exceeds fees {} plus reward {}",
                block.mint_tx.amount, total_fee, reward
            )));
        }
        Ok(())
    }

    fn dest_state<'a>(
        &self,
        states: &'a mut HashMap<Destination, DestState>,
        fork: &Hash,
        at: &Hash,
        dest: &Destination,
    ) -> ConsensusResult<&'a mut DestState> {
        match states.entry(*dest) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let state = self
                    .container
                    .retrieve_dest_state(fork, at, dest)
                    .map_err(ConsensusError::StorageError)?;
                Ok(e.insert(state))
            }
        }
    }

    /// Spends from redeem templates stay within the matured balance.
    fn verify_vote_redeem_tx(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<()> {
        let mut remaining: HashMap<Destination, Amount> = HashMap::new();
        for tx in &block.txs {
            if !tx.from.is_template_of(TemplateType::Redeem) {
                continue;
            }
            let balance = match remaining.entry(tx.from) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(
                    self.container
                        .retrieve_redeem_balance(&prev.hash, &tx.from)
                        .map_err(ConsensusError::StorageError)?,
                ),
            };
            let cost = tx.amount.saturating_add(tx.fee());
            if cost > *balance {
                return Err(ConsensusError::TransactionInputInvalid(format!(
                    "redeem spend {} beyond matured balance {}",
                    cost, balance
                )));
            }
            *balance -= cost;
        }
        Ok(())
    }

    fn check_signature(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<()> {
        let mint_template =
            self.resolve_template(&prev.origin, &prev.hash, &block.mint_tx.to, &block.mint_tx)?;
        self.core.check_block_signature(block, mint_template.as_ref())
    }

    fn verify_block_checkpoint(&self, fork: &Hash, block: &Block, hash: &Hash) -> ConsensusResult<()> {
        let height = block.height();
        if let Some(expected) = self.core.checkpoints().get(fork, height) {
            if expected != *hash {
                return Err(ConsensusError::BlockCheckpointMismatch { height, expected });
            }
        }
        Ok(())
    }

    fn admit_block(&self, block: &Block, hash: &Hash) -> ConsensusResult<BlockChainUpdate> {
        if self.container.exists(hash) {
            return Err(ConsensusError::AlreadyHave(*hash));
        }
        self.core.validate_block(block, self.time_source.now())?;
        if block.block_type.is_origin() {
            return Err(ConsensusError::BlockInvalidFork(
                "origin blocks are admitted separately".to_string(),
            ));
        }
        let prev = self.index(&block.prev)?;
        self.check_signature(block, &prev)?;
        self.verify_block_checkpoint(&prev.origin, block, hash)?;

        let (reward, trust) = self.verify_block(block, &prev)?;
        let reward_tx_count = self.verify_vote_reward_tx(block, &prev)?;
        self.verify_block_tx(block, &prev, reward, reward_tx_count)?;
        if block.block_type.is_primary() {
            self.verify_vote_redeem_tx(block, &prev)?;
        }

        let block_trust = self.core.get_block_trust(block, trust.source())?;
        self.container
            .storage_new_block(&prev.origin, block, block_trust, reward)
            .map_err(ConsensusError::StorageError)
    }

    fn admit_origin(&self, block: &Block, hash: &Hash) -> ConsensusResult<BlockChainUpdate> {
        if self.container.exists(hash) {
            return Err(ConsensusError::AlreadyHave(*hash));
        }
        self.core.validate_block(block, self.time_source.now())?;
        if block.block_type != BlockType::Origin {
            return Err(ConsensusError::BlockTypeInvalid(format!(
                "{} block is not an origin",
                block.block_type.name()
            )));
        }
        let prev = self.index(&block.prev)?;
        if prev.is_extended() || prev.is_vacant() {
            return Err(ConsensusError::BlockTypeInvalid(format!(
                "origin on a {} block",
                prev.block_type.name()
            )));
        }

        let height = block.height();
        match self.main_branch_at(self.core.genesis_hash(), height)? {
            Some(primary) if primary.timestamp == block.timestamp => {}
            _ => {
                return Err(ConsensusError::BlockTimestampOutOfRange(format!(
                    "origin time differs from the primary block at height {}",
                    height
                )))
            }
        }

        let profile = self.core.validate_origin(block)?;
        if profile.parent != prev.origin {
            return Err(ConsensusError::BlockInvalidFork(
                "profile parent differs from the previous block's fork".to_string(),
            ));
        }
        if let Some(existing) = self
            .container
            .list_forks()
            .into_iter()
            .find(|f| f.profile.name == profile.name)
        {
            return Err(ConsensusError::AlreadyHave(existing.fork));
        }

        self.check_signature(block, &prev)?;
        self.container
            .storage_new_block(hash, block, U256::zero(), Amount::zero())
            .map_err(ConsensusError::StorageError)
    }

    fn log_outcome(&self, block: &Block, hash: &Hash, result: &ConsensusResult<BlockChainUpdate>) {
        match result {
            Ok(update) => {
                tracing::info!(
                    "[hc-01] Accepted {} block {:?} at height {} (fork {:?}, new head: {})",
                    block.block_type.name(),
                    hash,
                    block.height(),
                    update.fork,
                    update.is_new_head()
                );
                metrics::record_block_accepted(block.block_type.name());
            }
            Err(e) if e.is_benign() => {
                tracing::debug!("[hc-01] Skipped block {:?}: {}", hash, e);
                metrics::record_block_rejected(e.code());
            }
            Err(e) => {
                tracing::warn!(
                    "[hc-01] Rejected {} block {:?}: {} ({})",
                    block.block_type.name(),
                    hash,
                    e,
                    e.code()
                );
                metrics::record_block_rejected(e.code());
            }
        }
    }

    // === VOTE REWARDS ===

    fn vote_reward_batches(&self, tail: &BlockIndex) -> ConsensusResult<RewardBatches> {
        if let Some(batches) = self.caches.vote_reward.get(&tail.origin, &tail.hash) {
            return Ok(batches);
        }
        let batches = Arc::new(self.calc_vote_reward_batches(tail)?);
        tracing::debug!(
            "[hc-01] Vote rewards for period ending {:?}: {} batches",
            tail.hash,
            batches.len()
        );
        metrics::record_vote_reward_calculation();
        self.caches
            .vote_reward
            .put(tail.origin, tail.hash, batches.clone());
        Ok(batches)
    }

    /// Reward transactions of the period ending at `tail`.
    fn calc_vote_reward_batches(&self, tail: &BlockIndex) -> ConsensusResult<Vec<Vec<Transaction>>> {
        let params = self.params_ref();
        let period = params.vote_reward_distribute_height();
        let begin_height = (tail.height + 1).saturating_sub(period).max(1);

        let mut calc: BTreeMap<u32, CalcBlock> = BTreeMap::new();
        let mut pow_surplus = Amount::zero();
        let mut total_mint_reward = Amount::zero();
        let mut index = tail.clone();
        while index.height >= begin_height && !index.is_origin() {
            total_mint_reward = total_mint_reward.saturating_add(index.mint_reward);
            if index.is_primary() && index.is_proof_of_work() {
                pow_surplus = pow_surplus.saturating_add(index.block_reward);
            } else if !index.is_vacant() {
                if !index.dest_mint.is_template_of(TemplateType::Delegate) {
                    return Err(ConsensusError::BlockTransactionsInvalid(format!(
                        "stake block {:?} not minted by a delegate",
                        index.hash
                    )));
                }
                let primary = self.reward_primary_of(&index)?;
                let entry = match calc.entry(index.height) {
                    BTreeEntry::Occupied(e) => e.into_mut(),
                    BTreeEntry::Vacant(e) => {
                        let reward_ratio = self
                            .container
                            .get_delegate_mint_reward_ratio(&primary, &index.dest_mint)
                            .map_err(ConsensusError::StorageError)?;
                        e.insert(CalcBlock {
                            primary_block: primary,
                            dest_mint: index.dest_mint,
                            reward_ratio,
                            reward_amount: Amount::zero(),
                        })
                    }
                };
                entry.reward_amount = entry.reward_amount.saturating_add(index.block_reward);
            }
            index = self.index(&index.prev)?;
        }

        let reference = if tail.is_primary() {
            tail.hash
        } else {
            tail.ref_block
        };
        let primary_at = |height: u32| {
            self.container
                .get_primary_height_block_time(&reference, height)
                .map(|(hash, _)| hash)
                .ok_or_else(|| {
                    ConsensusError::StorageError(format!("no primary block at height {}", height))
                })
        };
        let begin_primary = primary_at(begin_height - 1)?;
        let tail_primary = primary_at(tail.height.saturating_sub(1))?;

        let mut distribution = RewardDistribution::default();
        let foundation_ratio = params.foundation_reward_ratio;
        self.container
            .walk_through_day_vote(&begin_primary, &tail_primary, &mut |height, votes| {
                if let Some(c) = calc.get(&(height + 1)) {
                    distribute_height(c, votes.get(&c.dest_mint), foundation_ratio, &mut distribution);
                }
                true
            })
            .map_err(ConsensusError::StorageError)?;
        distribution.surplus = distribution.surplus.saturating_add(pow_surplus);

        let surplus_address = self
            .container
            .retrieve_function_address(&reference, FunctionId::PledgeSurplus);
        let foundation_address = self
            .container
            .retrieve_function_address(&reference, FunctionId::Foundation);

        let relations = self
            .container
            .list_invite_relation(&tail.origin, &tail.hash)
            .map_err(ConsensusError::StorageError)?;
        let invite = calc_invite_reward(&relations, total_mint_reward);
        let rewards = aggregate_rewards(&distribution, &invite, surplus_address, foundation_address);

        build_reward_batches(tail.origin, &rewards, self.max_reward_tx_count, |dest| {
            match dest.template_id().map(|tid| tid.kind) {
                None | Some(TemplateType::Delegate) | Some(TemplateType::Vote) => Ok(()),
                Some(other) => Err(ConsensusError::BlockTransactionsInvalid(format!(
                    "vote reward paid to a {} template",
                    other.name()
                ))),
            }
        })
    }

    /// Primary block a stake block's reward is accounted against. A fork
    /// block must be minted by the same delegate as its reference.
    fn reward_primary_of(&self, index: &BlockIndex) -> ConsensusResult<Hash> {
        if index.is_primary() {
            return Ok(index.hash);
        }
        let reference = self.index(&index.ref_block)?;
        if reference.dest_mint != index.dest_mint {
            return Err(ConsensusError::BlockTransactionsInvalid(format!(
                "{} block {:?} minted by {}, its reference by {}",
                index.block_type.name(),
                index.hash,
                index.dest_mint,
                reference.dest_mint
            )));
        }
        Ok(reference.hash)
    }

    /// Template data a reward transaction needs when the chain after `prev`
    /// does not know its recipient. Recipients on a fork fall back to the
    /// primary chain at the fork block's reference.
    fn reward_template_data(&self, prev: &BlockIndex, to: &Destination) -> ConsensusResult<Option<Vec<u8>>> {
        let Some(tid) = to.template_id() else {
            return Ok(None);
        };
        if self
            .container
            .retrieve_template_data(&prev.origin, &prev.hash, tid)
            .is_some()
        {
            return Ok(None);
        }
        if prev.is_primary() {
            return Err(ConsensusError::StorageError(format!(
                "no template data for reward recipient {}",
                to
            )));
        }
        self.container
            .retrieve_template_data(self.core.genesis_hash(), &prev.ref_block, tid)
            .map(Some)
            .ok_or_else(|| {
                ConsensusError::StorageError(format!(
                    "no template data for reward recipient {} at {:?}",
                    to, prev.ref_block
                ))
            })
    }
}

impl<C: BlockContainer> BlockChainApi for BlockChain<C> {
    fn insert_genesis_block(&self, block: &Block) -> ConsensusResult<BlockChainUpdate> {
        let _guard = self.add_lock.lock();
        let hash = block.hash();
        if !self.container.is_empty() {
            return Err(ConsensusError::AlreadyHave(hash));
        }
        self.core.validate_genesis(block)?;
        if hash != *self.core.genesis_hash() {
            return Err(ConsensusError::BlockInvalidFork(format!(
                "genesis {:?} differs from the configured {:?}",
                hash,
                self.core.genesis_hash()
            )));
        }
        let update = self
            .container
            .storage_new_block(&hash, block, U256::zero(), Amount::zero())
            .map_err(ConsensusError::StorageError)?;
        tracing::info!("[hc-01] Inserted genesis block {:?}", hash);
        Ok(update)
    }

    fn add_new_block(&self, block: &Block) -> ConsensusResult<BlockChainUpdate> {
        let _guard = self.add_lock.lock();
        let hash = block.hash();
        let result = self.admit_block(block, &hash);
        self.log_outcome(block, &hash, &result);
        result
    }

    fn add_new_origin(&self, block: &Block) -> ConsensusResult<BlockChainUpdate> {
        let _guard = self.add_lock.lock();
        let hash = block.hash();
        let result = self.admit_origin(block, &hash);
        self.log_outcome(block, &hash, &result);
        result
    }

    fn verify_pow_block(&self, block: &Block) -> ConsensusResult<bool> {
        self.core.validate_block(block, self.time_source.now())?;
        if !block.block_type.is_primary() || block.hash_work_proof().is_none() {
            return Err(ConsensusError::BlockTypeInvalid(
                "not a proof-of-work primary block".to_string(),
            ));
        }
        let prev = self.index(&block.prev)?;
        self.core.verify_proof_of_work(block, &prev)?;
        let head = self
            .container
            .retrieve_fork_last(self.core.genesis_hash())
            .ok_or_else(|| ConsensusError::StorageError("primary fork has no head".into()))?;
        let trust = prev
            .chain_trust
            .saturating_add(pow_block_trust(block.height(), &block.mint_tx.to));
        Ok(is_better_chain(trust, head.chain_trust))
    }

    fn genesis_hash(&self) -> Hash {
        *self.core.genesis_hash()
    }

    fn params(&self) -> Arc<ConsensusParams> {
        self.params.clone()
    }

    fn get_fork_status(&self) -> Vec<ForkStatus> {
        self.container.list_forks()
    }

    fn list_fork_profiles(&self) -> Vec<(Hash, ForkProfile)> {
        self.container
            .list_forks()
            .into_iter()
            .map(|f| (f.fork, f.profile))
            .collect()
    }

    fn get_fork_profile(&self, fork: &Hash) -> Option<ForkProfile> {
        self.container.retrieve_profile(fork)
    }

    fn get_block_index(&self, hash: &Hash) -> Option<BlockIndex> {
        self.container.retrieve_index(hash)
    }

    fn get_block_status(&self, hash: &Hash) -> Option<BlockStatus> {
        let index = self.container.retrieve_index(hash)?;
        Some(BlockStatus {
            fork: index.origin,
            hash: index.hash,
            prev: index.prev,
            height: index.height,
            number: index.number,
            timestamp: index.timestamp,
            mint_type: Some(index.mint_type),
            is_primary: index.is_primary(),
        })
    }

    fn get_fork_last(&self, fork: &Hash) -> Option<BlockIndex> {
        self.container.retrieve_fork_last(fork)
    }

    fn get_last_block_time(&self, fork: &Hash, depth: usize) -> Vec<u32> {
        let mut times = Vec::with_capacity(depth);
        let mut cursor = self.container.retrieve_fork_last(fork);
        while let Some(index) = cursor {
            if times.len() >= depth {
                break;
            }
            times.push(index.timestamp);
            if index.is_origin() {
                break;
            }
            cursor = self.container.retrieve_index(&index.prev);
        }
        times
    }

    fn get_primary_height_block_time(&self, reference: &Hash, height: u32) -> Option<(Hash, u32)> {
        self.container.get_primary_height_block_time(reference, height)
    }

    fn get_block_delegate_enrolled(&self, anchor: &Hash) -> ConsensusResult<DelegateEnrolled> {
        let index = self.index(anchor)?;
        self.enrolled_at(&index)
    }

    fn get_block_delegate_agreement(&self, hash: &Hash) -> ConsensusResult<DelegateAgreement> {
        if let Some(agreement) = self.caches.agreement.get(hash) {
            return Ok(agreement);
        }
        let index = self.index(hash)?;
        let params = self.params_ref();
        if !index.is_primary()
            || index.is_proof_of_work()
            || index.height < params.consensus_interval()
        {
            return Ok(DelegateAgreement::default());
        }

        let anchor = self.ancestor_back(&index, params.distribute_interval + 1)?;
        let enrolled = self.enrolled_at(&anchor)?;
        let block = self.block(hash)?;
        let proof = block.delegate_proof().ok_or_else(|| {
            ConsensusError::BlockProofOfStakeInvalid("stake block without delegate proof".into())
        })?;
        let (agreement, _) = self.agreement_from_proof(proof, &enrolled)?;
        self.caches.agreement.put(*hash, agreement.clone());
        Ok(agreement)
    }

    fn get_next_block_enrolled(&self, prev: &Hash) -> ConsensusResult<DelegateEnrolled> {
        let prev = self.index(prev)?;
        let params = self.params_ref();
        if prev.height + 1 < params.consensus_interval() {
            return Ok(DelegateEnrolled::default());
        }
        let anchor = self.ancestor_back(&prev, params.distribute_interval)?;
        self.enrolled_at(&anchor)
    }

    fn get_block_locator(&self, fork: &Hash, max: usize) -> Vec<Hash> {
        self.container.get_block_locator(fork, max)
    }

    fn get_block_inv(&self, fork: &Hash, locator: &[Hash], max: usize) -> Vec<Hash> {
        self.container.get_block_inv(fork, locator, max)
    }

    fn verify_checkpoint(&self, fork: &Hash, height: u32, hash: &Hash) -> bool {
        self.core.checkpoints().verify(fork, height, hash)
    }

    fn validate_checkpoints(&self) -> ConsensusResult<()> {
        for status in self.container.list_forks() {
            for (height, expected) in self.core.checkpoints().of_fork(&status.fork) {
                if height > status.last.height {
                    break;
                }
                let found = self.main_branch_at(&status.fork, height)?;
                if found.map(|i| i.hash) != Some(expected) {
                    tracing::error!(
                        "[hc-01] Local chain disagrees with checkpoint {} of fork {:?}",
                        height,
                        status.fork
                    );
                    return Err(ConsensusError::BlockCheckpointMismatch { height, expected });
                }
            }
        }
        Ok(())
    }

    fn get_block_mint_reward(&self, prev: &Hash) -> ConsensusResult<Amount> {
        let prev = self.index(prev)?;
        if prev.origin == *self.core.genesis_hash() {
            return Ok(block_reward_for(self.params_ref(), None, prev.height));
        }
        let profile = self.container.retrieve_profile(&prev.origin).ok_or_else(|| {
            ConsensusError::StorageError(format!("no profile for fork {:?}", prev.origin))
        })?;
        Ok(block_reward_for(self.params_ref(), Some(&profile), prev.height))
    }

    fn calc_block_vote_reward_tx(
        &self,
        prev: &Hash,
        block_type: BlockType,
        height: u32,
        time: u32,
    ) -> ConsensusResult<Vec<Transaction>> {
        let period = self.params_ref().vote_reward_distribute_height();
        let prev = self.index(prev)?;
        if period == 0
            || prev.height < period
            || height % period == 0
            || matches!(
                block_type,
                BlockType::Genesis | BlockType::Origin | BlockType::Vacant
            )
        {
            return Ok(Vec::new());
        }

        let mut calc_end = prev.clone();
        while calc_end.height % period != 0 {
            if calc_end.is_origin() {
                return Ok(Vec::new());
            }
            calc_end = self.index(&calc_end.prev)?;
        }
        if calc_end.origin != prev.origin {
            return Ok(Vec::new());
        }

        let batch_index = if block_type.is_primary() {
            (prev.height % period) as usize
        } else {
            let mut count = 0usize;
            let mut index = prev.clone();
            while index.hash != calc_end.hash {
                if !index.is_vacant() {
                    count += 1;
                }
                index = self.index(&index.prev)?;
            }
            count
        };

        let batches = self.vote_reward_batches(&calc_end)?;
        let Some(batch) = batches.get(batch_index) else {
            return Ok(Vec::new());
        };
        batch
            .iter()
            .map(|tx| {
                let mut tx = Transaction {
                    timestamp: time,
                    ..tx.clone()
                };
                if let Some(data) = self.reward_template_data(&prev, &tx.to)? {
                    tx.add_data(TxDataKey::TemplateData, data);
                }
                Ok(tx)
            })
            .collect()
    }

    fn get_next_block_timestamp(&self, prev: &Hash, mint_type: TxType) -> Option<u32> {
        let prev = self.container.retrieve_index(prev)?;
        Some(self.core.next_block_timestamp(&prev, mint_type))
    }

    fn get_dpos_timestamp(&self, prev: &Hash) -> Option<u32> {
        let prev = self.container.retrieve_index(prev)?;
        self.core.dpos_timestamp(&prev)
    }

    fn get_dest_state(&self, fork: &Hash, at: &Hash, dest: &Destination) -> ConsensusResult<DestState> {
        self.container
            .retrieve_dest_state(fork, at, dest)
            .map_err(ConsensusError::StorageError)
    }

    fn retrieve_template_data(&self, fork: &Hash, at: &Hash, tid: &TemplateId) -> Option<Vec<u8>> {
        self.container.retrieve_template_data(fork, at, tid)
    }

    fn create_block_state_root(&self, fork: &Hash, block: &Block) -> ConsensusResult<StateRootOutcome> {
        self.container
            .create_block_state_root(fork, block)
            .map_err(ConsensusError::StorageError)
    }
}
