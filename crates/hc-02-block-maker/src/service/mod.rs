//! # Block Maker Service
//!
//! Runs the production tasks around one shared [`MakerCore`]:
//!
//! ```text
//! handle_event ──tip──→ watch ──┬─→ maker task: next consensus → delegated block → fork blocks
//!                               └─→ pow task:   get_work → nonce search → submit_work
//! ```
//!
//! In fork mode a single task reacts to primary tips received from a peer
//! and only makes fork blocks on their agreement.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hc_01_consensus::{BlockChainApi, BlockIndex, ConsensusError, DelegateAgreement, TimeSource};
use parking_lot::Mutex;
use shared_types::{
    height_of, Amount, Block, BlockProof, BlockType, CertData, Destination, Hash, ProofOfPiggyback,
    Transaction, TxDataKey, TxType,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assembly::{arrange_block_tx, seal_block};
use crate::config::{BlockMakerConfig, NodeMode, PowProfileConfig};
use crate::domain::{
    initial_nonce, search_nonce, wait_new_block_time, AgreementBlock, ForkLagTracker,
    HashRateTuner, MakerProfile, NextConsensus, PowSchedule, SecretStore, TipStatus,
    POW_START_DELAY, WAIT_LAST_EXTENDED_TIME,
};
use crate::error::{BlockMakerError, Result};
use crate::metrics::MakerMetrics;
use crate::ports::{
    BlockDispatcher, BlockMakerService, ConsensusEngine, MakerStatus, TxPool, WorkService,
};


/// Dependencies for the block maker service
pub struct BlockMakerDependencies {
    pub chain: Arc<dyn BlockChainApi>,
    pub consensus: Arc<dyn ConsensusEngine>,
    pub tx_pool: Arc<dyn TxPool>,
    pub dispatcher: Arc<dyn BlockDispatcher>,
    pub work: Arc<dyn WorkService>,
    pub clock: Arc<dyn TimeSource>,
}

/// Fork blocks waiting for their time, ordered by time then arrival.
#[derive(Default)]
struct ForkQueue {
    tasks: BTreeMap<(u32, u64), (Hash, Block)>,
    seq: u64,
}

impl ForkQueue {
    fn push(&mut self, time: u32, fork: Hash, block: Block) {
        self.seq += 1;
        self.tasks.insert((time, self.seq), (fork, block));
    }

    fn pop(&mut self) -> Option<(u32, Hash, Block)> {
        self.tasks
            .pop_first()
            .map(|((time, _), (fork, block))| (time, fork, block))
    }
}

/// What became of a subsidiary block attempt.
#[derive(Debug, PartialEq, Eq)]
enum Subsidiary {
    Dispatched,
    /// The fork head may still get an extended block; try again shortly.
    Requeue,
    Skipped,
}

pub(crate) struct MakerCore {
    config: BlockMakerConfig,
    chain: Arc<dyn BlockChainApi>,
    consensus: Arc<dyn ConsensusEngine>,
    tx_pool: Arc<dyn TxPool>,
    dispatcher: Arc<dyn BlockDispatcher>,
    work: Arc<dyn WorkService>,
    clock: Arc<dyn TimeSource>,

    /// Delegate profiles by mint destination.
    profiles: BTreeMap<Destination, MakerProfile>,
    work_profile: Option<MakerProfile>,

    tip: watch::Sender<TipStatus>,
    cancel: CancellationToken,
    active: AtomicBool,

    fork_lag: Mutex<ForkLagTracker>,
    hash_rate: Mutex<HashRateTuner>,
    metrics: MakerMetrics,
}

/// Block maker: delegated, fork and proof-of-work production.
pub struct BlockMaker {
    core: Arc<MakerCore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BlockMaker {
    pub fn new(config: BlockMakerConfig, deps: BlockMakerDependencies) -> Result<Self> {
        config.validate()?;

        let mut profiles = BTreeMap::new();
        for delegate in &config.delegates {
            let profile = delegate.to_profile()?;
            profiles.insert(profile.destination(), profile);
        }
        let work_profile = config
            .pow
            .as_ref()
            .map(PowProfileConfig::to_profile)
            .transpose()?;

        let genesis = deps.chain.genesis_hash();
        let tip = deps
            .chain
            .get_fork_last(&genesis)
            .map(|last| TipStatus::from(&last))
            .unwrap_or_default();
        let (tip_tx, _) = watch::channel(tip);

        tracing::info!(
            "[hc-02] Block maker configured: mode {:?}, {} delegates, pow {}",
            config.mode,
            profiles.len(),
            work_profile.is_some()
        );

        let hash_rate = HashRateTuner::new(config.initial_hash_rate);
        Ok(Self {
            core: Arc::new(MakerCore {
                config,
                chain: deps.chain,
                consensus: deps.consensus,
                tx_pool: deps.tx_pool,
                dispatcher: deps.dispatcher,
                work: deps.work,
                clock: deps.clock,
                profiles,
                work_profile,
                tip: tip_tx,
                cancel: CancellationToken::new(),
                active: AtomicBool::new(false),
                fork_lag: Mutex::new(ForkLagTracker::default()),
                hash_rate: Mutex::new(hash_rate),
                metrics: MakerMetrics::new(),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn metrics(&self) -> &MakerMetrics {
        &self.core.metrics
    }

    /// Mint destinations of the local delegates.
    pub fn delegate_destinations(&self) -> Vec<Destination> {
        self.core.profiles.keys().copied().collect()
    }

    /// Commits a fresh enrollment secret for every local delegate at
    /// `height`. The returned cert data goes into each delegate's CERT
    /// transaction.
    pub fn enroll_delegates(
        &self,
        secrets: &SecretStore,
        height: u32,
    ) -> Vec<(Destination, CertData)> {
        self.core
            .profiles
            .values()
            .map(|profile| (profile.destination(), profile.enrollment(secrets, height)))
            .collect()
    }
}

impl MakerCore {
    fn genesis(&self) -> Hash {
        self.chain.genesis_hash()
    }

    fn spacing(&self) -> u32 {
        self.chain.params().block_target_spacing
    }

    fn now(&self) -> i64 {
        i64::from(self.clock.now())
    }

    fn handle_event(&self, tip: TipStatus) -> bool {
        self.tip.send_if_modified(|current| {
            if current.hash == tip.hash {
                return false;
            }
            tracing::debug!("[hc-02] New primary tip {} at height {}", tip.hash, tip.height);
            *current = tip;
            true
        })
    }

    /// Sleeps `secs` seconds. False once halted.
    async fn wait_exit(&self, secs: i64) -> bool {
        if secs <= 0 {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(Duration::from_secs(secs as u64)) => true,
        }
    }

    async fn wait_until(&self, time: u32) -> bool {
        self.wait_exit(i64::from(time) - self.now()).await
    }

    /// Waits for a new tip or `secs` seconds. False once halted.
    async fn wait_update_event(&self, rx: &mut watch::Receiver<TipStatus>, secs: i64) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            changed = rx.changed() => changed.is_ok(),
            _ = tokio::time::sleep(Duration::from_secs(secs.max(1) as u64)) => true,
        }
    }

    fn log_error(&self, what: &str, err: &BlockMakerError) {
        if err.is_recoverable() {
            tracing::warn!("[hc-02] {} failed: {}", what, err);
        } else {
            tracing::error!("[hc-02] {} failed: {}", what, err);
        }
    }

    // =========================================================================
    // Block construction
    // =========================================================================

    fn prepare_block(&self, agree: &AgreementBlock) -> Block {
        let mut block = Block::new(BlockType::Primary, agree.prev, 0, agree.prev_number + 1);
        block.set_proof(BlockProof::Delegate(agree.shares.to_proof()));
        block
    }

    fn prepare_piggyback(&self, proof: &ProofOfPiggyback, ref_time: u32, last: &BlockIndex) -> Block {
        let mut block = Block::new(BlockType::Subsidiary, Hash::zero(), ref_time, last.number + 1);
        block.set_proof(BlockProof::Piggyback(*proof));
        block
    }

    /// Stake mint of `amount` to the profile, introducing its template when
    /// the fork does not know it yet.
    fn mint_tx(&self, block: &Block, fork: &Hash, profile: &MakerProfile, amount: Amount) -> Transaction {
        let dest = profile.destination();
        let mut tx = Transaction {
            tx_type: TxType::Stake,
            fork: *fork,
            timestamp: block.timestamp,
            nonce: block.number,
            to: dest,
            amount,
            ..Default::default()
        };
        if let (Some(tid), Some(data)) = (dest.template_id(), profile.template_data()) {
            if self.chain.retrieve_template_data(fork, &block.prev, tid).is_none() {
                tx.add_data(TxDataKey::TemplateData, data);
            }
        }
        tx
    }

    async fn arrange_block_tx(&self, block: &mut Block, fork: &Hash, profile: &MakerProfile) -> Result<()> {
        arrange_block_tx(
            self.chain.as_ref(),
            self.tx_pool.as_ref(),
            block,
            fork,
            profile.signature_size(),
        )
        .await
    }

    fn sign_block(&self, block: &mut Block, profile: &MakerProfile) {
        profile.sign(block);
    }

    async fn create_delegated_block(&self, block: &mut Block, fork: &Hash, profile: &MakerProfile) -> Result<()> {
        let reward = self.chain.get_block_mint_reward(&block.prev)?;
        block.mint_tx = self.mint_tx(block, fork, profile, reward);
        self.arrange_block_tx(block, fork, profile).await?;
        self.sign_block(block, profile);
        Ok(())
    }

    fn create_vacant(
        &self,
        fork: &Hash,
        prev: &BlockIndex,
        time: u32,
        profile: &MakerProfile,
        proof: &ProofOfPiggyback,
    ) -> Result<Block> {
        let mut block = Block::new(BlockType::Vacant, prev.hash, time, prev.number + 1);
        block.set_proof(BlockProof::Piggyback(*proof));
        block.mint_tx = self.mint_tx(&block, fork, profile, Amount::zero());
        seal_block(self.chain.as_ref(), fork, &mut block)?;
        self.sign_block(&mut block, profile);
        Ok(block)
    }

    /// Next extended block after `prev`, while it still fits in the slot
    /// opened by the reference block.
    #[allow(clippy::too_many_arguments)]
    fn create_extended(
        &self,
        fork: &Hash,
        profile: &MakerProfile,
        proof: &ProofOfPiggyback,
        prev: Hash,
        prev_time: u32,
        prev_number: u64,
        ref_time: u32,
    ) -> Option<Block> {
        if !self.config.extended_blocks {
            return None;
        }
        let params = self.chain.params();
        let time = prev_time + params.extended_block_spacing.max(1);
        if time >= ref_time + params.block_target_spacing {
            return None;
        }
        let mut block = Block::new(BlockType::Extended, prev, time, prev_number + 1);
        block.set_proof(BlockProof::Piggyback(*proof));
        block.mint_tx = self.mint_tx(&block, fork, profile, Amount::zero());
        Some(block)
    }

    /// Hands a finished block to the chain once its time has come.
    async fn dispatch_block(&self, fork: &Hash, block: &Block) -> Result<()> {
        if !self.wait_until(block.timestamp).await {
            return Err(BlockMakerError::Halted);
        }
        let hash = block.hash();
        let height = block.height();
        if !block.block_type.is_extended() && !self.chain.verify_checkpoint(fork, height, &hash) {
            return Err(BlockMakerError::CheckpointMismatch(height));
        }

        match self.dispatcher.add_new_block(block).await {
            Ok(update) => {
                self.metrics.record_block_produced(block.block_type.name());
                tracing::info!(
                    "[hc-02] Dispatched {} block {} at height {} on fork {}",
                    block.block_type.name(),
                    hash,
                    height,
                    fork
                );
                if update.fork == self.genesis() && update.is_new_head() {
                    self.handle_event(TipStatus::from(&update.last));
                }
                Ok(())
            }
            Err(ConsensusError::AlreadyHave(_)) => {
                tracing::debug!("[hc-02] Block {} already in chain", hash);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_dispatch_failure();
                tracing::warn!("[hc-02] Chain refused {} block {}: {}", block.block_type.name(), hash, e);
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Delegated production
    // =========================================================================

    async fn process_delegated_proof_of_stake(&self, agree: &AgreementBlock) -> Result<()> {
        let leader = agree.agreement.ballot(0);
        let Some(profile) = self.profiles.get(&leader) else {
            tracing::debug!("[hc-02] Ballot leader {:?} is not a local delegate", leader);
            return Ok(());
        };

        let mut block = self.prepare_block(agree);
        block.timestamp = self
            .chain
            .get_dpos_timestamp(&agree.prev)
            .ok_or(BlockMakerError::NoSlotTime(agree.prev))?;

        let genesis = self.genesis();
        self.create_delegated_block(&mut block, &genesis, profile).await?;
        self.dispatch_block(&genesis, &block).await?;

        self.process_sub_fork(
            profile,
            &agree.agreement,
            &block.hash(),
            block.timestamp,
            agree.prev_height,
            agree.prev_mint_type,
        )
        .await;
        Ok(())
    }

    /// Makes the subsidiary block of every followed fork on the agreement of
    /// `ref_block`, then extended blocks while the pool has transactions.
    pub(crate) async fn process_sub_fork(
        &self,
        profile: &MakerProfile,
        agreement: &DelegateAgreement,
        ref_block: &Hash,
        ref_time: u32,
        prev_height: u32,
        prev_mint_type: TxType,
    ) {
        let proof = ProofOfPiggyback {
            weight: u8::try_from(agreement.weight).unwrap_or(u8::MAX),
            agreement: agreement.agreement,
            ref_block: *ref_block,
        };
        let genesis = self.genesis();

        let mut queue = ForkQueue::default();
        for status in self.chain.get_fork_status() {
            if status.fork == genesis || !self.config.allows_fork(&status.fork) {
                continue;
            }
            queue.push(ref_time, status.fork, self.prepare_piggyback(&proof, ref_time, &status.last));
        }

        while let Some((time, fork, mut block)) = queue.pop() {
            if !self.wait_until(time).await {
                return;
            }

            let next_from = if block.block_type.is_subsidiary() {
                match self
                    .make_subsidiary(&fork, &mut block, profile, &proof, prev_height, prev_mint_type)
                    .await
                {
                    Ok(Subsidiary::Dispatched) => Some((block.hash(), block.timestamp, block.number)),
                    Ok(Subsidiary::Requeue) => {
                        let retry = u32::try_from(self.now() + 1).unwrap_or(u32::MAX);
                        queue.push(retry, fork, block);
                        None
                    }
                    Ok(Subsidiary::Skipped) => None,
                    Err(e) => {
                        self.log_error("Subsidiary block", &e);
                        None
                    }
                }
            } else {
                match self.make_extended(&fork, &mut block, profile).await {
                    Ok(true) => Some((block.hash(), block.timestamp, block.number)),
                    // nothing to pack: the next attempt keeps prev and number
                    Ok(false) => Some((block.prev, block.timestamp, block.number - 1)),
                    Err(e) => {
                        self.log_error("Extended block", &e);
                        None
                    }
                }
            };

            if let Some((prev, prev_time, prev_number)) = next_from {
                if let Some(next) =
                    self.create_extended(&fork, profile, &proof, prev, prev_time, prev_number, ref_time)
                {
                    queue.push(next.timestamp, fork, next);
                }
            }
        }
    }

    async fn make_subsidiary(
        &self,
        fork: &Hash,
        block: &mut Block,
        profile: &MakerProfile,
        proof: &ProofOfPiggyback,
        prev_height: u32,
        prev_mint_type: TxType,
    ) -> Result<Subsidiary> {
        let last = self
            .chain
            .get_fork_last(fork)
            .ok_or_else(|| BlockMakerError::Internal(format!("fork {} has no head", fork)))?;
        let ref_time = block.timestamp;
        let primary_height = prev_height + 1;
        let last_extended_waited = self.now() - i64::from(ref_time) >= WAIT_LAST_EXTENDED_TIME;
        let extended_spacing = self.chain.params().extended_block_spacing;

        let prev = if !self.refers_to_long_chain(&last, &proof.ref_block) {
            tracing::error!("[hc-02] Fork {} does not refer to the long chain", fork);
            return Ok(Subsidiary::Skipped);
        } else if last.height > prev_height {
            self.last_block_at_height(&last, prev_height).ok_or_else(|| {
                BlockMakerError::Internal(format!("fork {} has no block at {}", fork, prev_height))
            })?
        } else if last.height == prev_height {
            if prev_mint_type != TxType::Stake
                || last.timestamp + extended_spacing == ref_time
                || last_extended_waited
            {
                last
            } else {
                return Ok(Subsidiary::Requeue);
            }
        } else if !last.is_origin() && ForkLagTracker::is_lagging(last.height, primary_height) {
            let replenish = self
                .fork_lag
                .lock()
                .should_replenish(fork, last.height, primary_height);
            if !replenish {
                tracing::warn!(
                    "[hc-02] Fork {} is missing too many blocks: head {}, primary {}",
                    fork,
                    last.height,
                    primary_height
                );
                return Ok(Subsidiary::Skipped);
            }
            self.replenish_sub_fork_vacant(fork, last, primary_height, profile, proof)
                .await?
        } else if prev_mint_type != TxType::Stake || last_extended_waited {
            self.replenish_sub_fork_vacant(fork, last, primary_height, profile, proof)
                .await?
        } else {
            return Ok(Subsidiary::Requeue);
        };

        block.prev = prev.hash;
        block.number = prev.number + 1;
        self.create_delegated_block(block, fork, profile).await?;
        self.dispatch_block(fork, block).await?;
        self.fork_lag.lock().forget(fork);
        Ok(Subsidiary::Dispatched)
    }

    /// Extended block with whatever the pool holds. False when there was
    /// nothing to pack.
    async fn make_extended(&self, fork: &Hash, block: &mut Block, profile: &MakerProfile) -> Result<bool> {
        self.arrange_block_tx(block, fork, profile).await?;
        if block.txs.is_empty() {
            return Ok(false);
        }
        self.sign_block(block, profile);
        self.dispatch_block(fork, block).await?;
        Ok(true)
    }

    /// Fills a fork from its head up to just below `primary_height` with
    /// vacant blocks. Returns the new head.
    async fn replenish_sub_fork_vacant(
        &self,
        fork: &Hash,
        last: BlockIndex,
        primary_height: u32,
        profile: &MakerProfile,
        proof: &ProofOfPiggyback,
    ) -> Result<BlockIndex> {
        let mut prev = last;
        for height in prev.height + 1..primary_height {
            let (_, time) = self
                .chain
                .get_primary_height_block_time(&proof.ref_block, height)
                .ok_or(BlockMakerError::NoSlotTime(proof.ref_block))?;
            let vacant = self.create_vacant(fork, &prev, time, profile, proof)?;
            self.dispatch_block(fork, &vacant).await?;
            prev = self
                .chain
                .get_block_index(&vacant.hash())
                .ok_or_else(|| BlockMakerError::Internal(format!("vacant {} not indexed", vacant.hash())))?;
        }
        Ok(prev)
    }

    /// Whether the primary block the fork head hangs off is an ancestor of
    /// `ref_block`.
    fn refers_to_long_chain(&self, head: &BlockIndex, ref_block: &Hash) -> bool {
        let anchor = if head.is_origin() { head.prev } else { head.ref_block };
        let anchor_height = height_of(&anchor);
        let mut cursor = *ref_block;
        loop {
            if cursor == anchor {
                return true;
            }
            match self.chain.get_block_index(&cursor) {
                Some(index) if index.height > anchor_height && !index.prev.is_zero() => {
                    cursor = index.prev
                }
                _ => return false,
            }
        }
    }

    /// Newest block at `height` on the branch ending at `head`.
    fn last_block_at_height(&self, head: &BlockIndex, height: u32) -> Option<BlockIndex> {
        let mut index = head.clone();
        loop {
            if index.height == height {
                return Some(index);
            }
            if index.height < height || index.is_origin() {
                return None;
            }
            index = self.chain.get_block_index(&index.prev)?;
        }
    }

    // =========================================================================
    // Proof of work
    // =========================================================================

    fn interrupted_pow(&self, prev: &Hash) -> bool {
        self.tip.borrow().hash != *prev
    }

    /// Mines one proof-of-work block on the current tip. `None` when a new
    /// tip arrived first or no work was available.
    async fn create_proof_of_work(&self, profile: &MakerProfile) -> Result<Option<Hash>> {
        let Some(mut work) = self.work.get_work(&profile.destination()).await? else {
            return Ok(None);
        };
        let now = self.clock.now();
        if let Some(proof) = work.block.hash_work_proof_mut() {
            proof.nonce = initial_nonce(now);
        }
        let time_diff = i64::from(work.block.timestamp) - i64::from(now);

        tracing::info!(
            "[hc-02] Mining height {} after {}, bits {}",
            work.prev_height + 1,
            work.prev,
            work.bits
        );

        loop {
            if self.cancel.is_cancelled() {
                return Err(BlockMakerError::Halted);
            }
            if self.interrupted_pow(&work.prev) {
                tracing::debug!("[hc-02] Mining on {} interrupted by a new tip", work.prev);
                return Ok(None);
            }

            let rate = self.hash_rate.lock().rate();
            let found = search_nonce(&mut work.block, work.bits, rate);
            self.metrics.record_pow_hashes(rate);

            if found.is_some() {
                self.sign_block(&mut work.block, profile);
                let hash = self.work.submit_work(&work.block).await?;
                self.metrics.record_block_produced(BlockType::Primary.name());
                tracing::info!(
                    "[hc-02] Mined block {} at height {}",
                    hash,
                    work.prev_height + 1
                );
                if let Some(last) = self.chain.get_fork_last(&self.genesis()) {
                    self.handle_event(TipStatus::from(&last));
                }
                return Ok(Some(hash));
            }

            let net_time = u32::try_from((self.now() + time_diff).max(0)).unwrap_or(u32::MAX);
            let retime = self.hash_rate.lock().after_batch(work.block.timestamp, net_time);
            if let Some(time) = retime {
                self.retime_work_block(&mut work.block, time)?;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Moves a proof-of-work block to `time`, recomputing its vote rewards.
    fn retime_work_block(&self, block: &mut Block, time: u32) -> Result<()> {
        let rewards = self
            .chain
            .calc_block_vote_reward_tx(&block.prev, block.block_type, block.height(), time)?;
        block.txs.retain(|tx| tx.tx_type != TxType::VoteReward);
        block.txs.splice(0..0, rewards);
        block.timestamp = time;
        block.mint_tx.timestamp = time;
        seal_block(self.chain.as_ref(), &self.genesis(), block)
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    async fn run_maker(self: Arc<Self>) {
        tracing::info!("[hc-02] Block maker started in {:?} mode", self.config.mode);
        let mut rx = self.tip.subscribe();
        let max_wait = wait_new_block_time(self.spacing());
        let mut wait = 0i64;
        let mut announced: Option<(Hash, bool)> = None;
        let mut made_after: Option<Hash> = None;

        loop {
            if !self.wait_update_event(&mut rx, wait.clamp(1, max_wait)).await {
                break;
            }
            let agree = match self.consensus.get_next_consensus().await {
                Ok(NextConsensus::Ready(agree)) => agree,
                Ok(NextConsensus::Wait { wait_time, .. }) => {
                    wait = wait_time;
                    continue;
                }
                Err(e) => {
                    self.log_error("Consensus", &e);
                    wait = 1;
                    continue;
                }
            };

            let is_pow = agree.agreement.is_proof_of_work();
            if announced != Some((agree.prev, is_pow)) {
                tracing::info!(
                    "[hc-02] Agreement after {} (height {}): {}",
                    agree.prev,
                    agree.prev_height,
                    if is_pow { "proof of work" } else { "delegated" }
                );
                announced = Some((agree.prev, is_pow));
            }
            wait = max_wait;
            if made_after == Some(agree.prev) {
                continue;
            }

            if !is_pow {
                if let Err(e) = self.process_delegated_proof_of_stake(&agree).await {
                    if matches!(e, BlockMakerError::Halted) {
                        break;
                    }
                    self.log_error("Delegated block", &e);
                    wait = 1;
                    continue;
                }
            }
            made_after = Some(agree.prev);
            self.dispatcher.set_consensus(&agree).await;
        }
        tracing::info!("[hc-02] Block maker stopped");
    }

    async fn run_pow(self: Arc<Self>) {
        let Some(profile) = self.work_profile.as_ref() else {
            return;
        };
        tracing::info!("[hc-02] Proof-of-work miner started for {:?}", profile.destination());
        if !self.wait_exit(POW_START_DELAY).await {
            return;
        }
        let mut schedule = PowSchedule::default();
        loop {
            if !self.wait_exit(1).await {
                break;
            }
            let tip = self.tip.borrow().clone();
            if !schedule.ready(&tip, self.clock.now(), self.spacing()) {
                continue;
            }
            match self.create_proof_of_work(profile).await {
                Ok(_) => {}
                Err(BlockMakerError::Halted) => break,
                Err(e) => self.log_error("Proof of work", &e),
            }
        }
        tracing::info!("[hc-02] Proof-of-work miner stopped");
    }

    async fn run_fork(self: Arc<Self>) {
        tracing::info!("[hc-02] Fork block maker started");
        let mut rx = self.tip.subscribe();
        let max_wait = wait_new_block_time(self.spacing());
        let mut last_tip = Hash::zero();

        loop {
            if !self.wait_update_event(&mut rx, max_wait).await {
                break;
            }
            let tip = rx.borrow_and_update().clone();
            if tip.hash == last_tip || i64::from(tip.timestamp) < self.now() - i64::from(self.spacing()) {
                continue;
            }
            last_tip = tip.hash;
            if let Err(e) = self.process_tip_sub_fork(&tip).await {
                self.log_error("Fork blocks", &e);
            }
        }
        tracing::info!("[hc-02] Fork block maker stopped");
    }

    /// Fork blocks on the agreement of a primary tip made elsewhere.
    pub(crate) async fn process_tip_sub_fork(&self, tip: &TipStatus) -> Result<()> {
        let agreement = self.chain.get_block_delegate_agreement(&tip.hash)?;
        if agreement.is_proof_of_work() {
            return Ok(());
        }
        let Some(profile) = self.profiles.get(&agreement.ballot(0)) else {
            return Ok(());
        };
        let prev = self
            .chain
            .get_block_status(&tip.prev)
            .ok_or_else(|| BlockMakerError::Internal(format!("tip parent {} unknown", tip.prev)))?;
        self.process_sub_fork(
            profile,
            &agreement,
            &tip.hash,
            tip.timestamp,
            prev.height,
            prev.mint_type.unwrap_or(TxType::Genesis),
        )
        .await;
        Ok(())
    }
}

#[async_trait]
impl BlockMakerService for BlockMaker {
    fn handle_event(&self, tip: TipStatus) {
        self.core.handle_event(tip);
    }

    async fn start(&self) -> Result<()> {
        if self.core.cancel.is_cancelled() {
            return Err(BlockMakerError::Halted);
        }
        if self.core.active.swap(true, Ordering::SeqCst) {
            tracing::warn!("[hc-02] Block maker already running");
            return Ok(());
        }

        let mut tasks = self.tasks.lock();
        match self.core.config.mode {
            NodeMode::Common | NodeMode::Super => {
                tasks.push(tokio::spawn(Arc::clone(&self.core).run_maker()));
                if self.core.work_profile.is_some() {
                    tasks.push(tokio::spawn(Arc::clone(&self.core).run_pow()));
                }
            }
            NodeMode::Fork => tasks.push(tokio::spawn(Arc::clone(&self.core).run_fork())),
        }
        Ok(())
    }

    async fn halt(&self) -> Result<()> {
        self.core.cancel.cancel();
        self.core.active.store(false, Ordering::SeqCst);
        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("[hc-02] Maker task ended abnormally: {}", e);
            }
        }
        tracing::info!("[hc-02] Block maker halted");
        Ok(())
    }

    fn status(&self) -> MakerStatus {
        MakerStatus {
            active: self.core.active.load(Ordering::SeqCst),
            mode: self.core.config.mode,
            tip_height: self.core.tip.borrow().height,
            blocks_produced: self.core.metrics.blocks_produced(),
            vacant_blocks: self.core.metrics.vacant_blocks(),
            hash_rate: self.core.hash_rate.lock().rate(),
        }
    }
}
