//! # Core Protocol
//!
//! Stateless block and transaction rules. Everything that needs storage is
//! resolved by the caller and passed in: previous and reference indices,
//! agreements, sender state and decoded templates.

use std::sync::Arc;

use shared_types::{
    crypto::verify_hash, Block, BlockType, DestState, Destination, ForkProfile, Hash, Transaction,
    TxType, POW_ALGO_KECCAK, U256,
};

use super::agreement::DelegateAgreement;
use super::block_index::BlockIndex;
use super::checkpoints::CheckpointTable;
use super::error::{ConsensusError, ConsensusResult};
use super::template::{TemplateKind, TemplateRuleContext};
use super::trust::{inherited_trust, pow_block_trust};
use crate::params::{
    ConsensusParams, DATA_GAS_PER_BYTE, MAX_BLOCK_SIZE, MAX_CLOCK_DRIFT, MAX_TX_SIZE,
    MIN_GAS_PRICE, PROOF_OF_WORK_BITS, TX_BASE_GAS,
};

/// Storage-resolved inputs of a transaction check.
pub struct TxContext<'a> {
    /// Fork the enclosing block is on.
    pub fork: &'a Hash,
    pub from_state: &'a DestState,
    pub from_template: Option<&'a TemplateKind>,
    pub to_template: Option<&'a TemplateKind>,
}

/// What a block's trust is derived from.
pub enum TrustSource<'a> {
    /// Genesis, origin and vacant blocks.
    None,
    /// Enroll trust of a proof-of-stake agreement.
    Stake(U256),
    /// Proof-of-work primary block.
    Work,
    /// Fork block inheriting its primary anchor's delta.
    Reference {
        reference: &'a BlockIndex,
        reference_prev: Option<&'a BlockIndex>,
    },
}

pub struct CoreProtocol {
    params: Arc<ConsensusParams>,
    genesis: Hash,
    checkpoints: CheckpointTable,
}

impl CoreProtocol {
    pub fn new(params: Arc<ConsensusParams>, genesis: Hash) -> Self {
        let checkpoints = CheckpointTable::new(&params.checkpoints);
        Self {
            params,
            genesis,
            checkpoints,
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn genesis_hash(&self) -> &Hash {
        &self.genesis
    }

    pub fn checkpoints(&self) -> &CheckpointTable {
        &self.checkpoints
    }

    /// Context-free block checks.
    pub fn validate_block(&self, block: &Block, now: u32) -> ConsensusResult<()> {
        if block.timestamp > now.saturating_add(MAX_CLOCK_DRIFT) {
            return Err(ConsensusError::BlockTimestampOutOfRange(format!(
                "{} is ahead of local time {}",
                block.timestamp, now
            )));
        }

        self.validate_proof_kind(block)?;

        if block.block_type.is_vacant() {
            let mint = &block.mint_tx;
            if !mint.amount.is_zero() || mint.tx_type != TxType::Stake || mint.to.is_null() {
                return Err(ConsensusError::BlockTransactionsInvalid(
                    "vacant block mint must be an empty stake mint".to_string(),
                ));
            }
            if !block.txs.is_empty() || !block.merkle_root.is_zero() {
                return Err(ConsensusError::BlockTransactionsInvalid(
                    "vacant block carries transactions".to_string(),
                ));
            }
            return Ok(());
        }

        let size = block.serialized_size();
        if size > MAX_BLOCK_SIZE {
            return Err(ConsensusError::BlockOversize {
                size,
                limit: MAX_BLOCK_SIZE,
            });
        }

        if block.block_type.is_origin() && !block.txs.is_empty() {
            return Err(ConsensusError::BlockTransactionsInvalid(
                "origin block carries transactions".to_string(),
            ));
        }

        if block.calc_merkle_root() != block.merkle_root {
            return Err(ConsensusError::BlockTxHashMerkleRootInvalid);
        }
        if block.has_duplicate_tx() {
            return Err(ConsensusError::BlockDuplicatedTransaction);
        }
        if block.txs.iter().any(|tx| tx.tx_type.is_mint()) {
            return Err(ConsensusError::BlockTransactionsInvalid(
                "mint transaction inside block body".to_string(),
            ));
        }

        self.validate_mint_type(block)
    }

    fn validate_proof_kind(&self, block: &Block) -> ConsensusResult<()> {
        let ok = match block.block_type {
            BlockType::Genesis | BlockType::Origin => block.profile().is_some(),
            BlockType::Primary => {
                block.delegate_proof().is_some() || block.hash_work_proof().is_some()
            }
            BlockType::Subsidiary | BlockType::Extended | BlockType::Vacant => {
                block.piggyback_proof().is_some()
            }
        };
        if !ok {
            return Err(ConsensusError::BlockFormatInvalid(format!(
                "{} block without its proof",
                block.block_type.name()
            )));
        }
        Ok(())
    }

    fn validate_mint_type(&self, block: &Block) -> ConsensusResult<()> {
        let expected = match block.block_type {
            BlockType::Genesis | BlockType::Origin => TxType::Genesis,
            BlockType::Primary if block.hash_work_proof().is_some() => TxType::Work,
            _ => TxType::Stake,
        };
        if block.mint_tx.tx_type != expected {
            return Err(ConsensusError::BlockTransactionsInvalid(format!(
                "{} block minted with {:?}",
                block.block_type.name(),
                block.mint_tx.tx_type
            )));
        }
        Ok(())
    }

    /// Genesis block layout.
    pub fn validate_genesis(&self, block: &Block) -> ConsensusResult<()> {
        if !block.block_type.is_genesis() || !block.prev.is_zero() {
            return Err(ConsensusError::BlockTypeInvalid(
                "not a genesis block".to_string(),
            ));
        }
        let profile = block.profile().ok_or_else(|| {
            ConsensusError::BlockFormatInvalid("genesis without profile".to_string())
        })?;
        self.validate_profile_mint(block, profile)
    }

    /// Origin block layout. Name uniqueness is checked by the caller.
    pub fn validate_origin(&self, block: &Block) -> ConsensusResult<ForkProfile> {
        let profile = block.profile().ok_or_else(|| {
            ConsensusError::BlockFormatInvalid("origin without profile".to_string())
        })?;
        if profile.parent.is_zero() {
            return Err(ConsensusError::BlockInvalidFork(
                "origin profile without parent".to_string(),
            ));
        }
        if !block.txs.is_empty() {
            return Err(ConsensusError::BlockTransactionsInvalid(
                "origin block carries transactions".to_string(),
            ));
        }
        self.validate_profile_mint(block, profile)?;
        Ok(profile.clone())
    }

    fn validate_profile_mint(&self, block: &Block, profile: &ForkProfile) -> ConsensusResult<()> {
        if !profile.is_valid() {
            return Err(ConsensusError::BlockInvalidFork(format!(
                "incomplete profile '{}'",
                profile.name
            )));
        }
        let mint = &block.mint_tx;
        if mint.tx_type != TxType::Genesis || mint.to != profile.owner || mint.amount != profile.amount
        {
            return Err(ConsensusError::BlockCoinbaseInvalid(
                "mint does not pay the profile amount to its owner".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks the block signature against the mint destination's key.
    ///
    /// `mint_template` is the decoded template when the mint goes to a
    /// template address.
    pub fn check_block_signature(
        &self,
        block: &Block,
        mint_template: Option<&TemplateKind>,
    ) -> ConsensusResult<()> {
        if block.block_type.is_genesis() {
            return Ok(());
        }
        let key = match &block.mint_tx.to {
            Destination::PubKey(key) => Some(*key),
            Destination::Template(_) => mint_template.and_then(TemplateKind::mint_key),
            Destination::Null => None,
        }
        .ok_or(ConsensusError::BlockSignatureInvalid)?;
        if !verify_hash(&key, &block.hash(), &block.signature) {
            return Err(ConsensusError::BlockSignatureInvalid);
        }
        Ok(())
    }

    /// Earliest timestamp of a block minted with `mint_type` after `prev`.
    pub fn next_block_timestamp(&self, prev: &BlockIndex, mint_type: TxType) -> u32 {
        let spacing = if prev.is_proof_of_work() || prev.is_genesis() {
            if mint_type == TxType::Stake {
                self.params.block_target_spacing
            } else {
                self.params.pow_block_spacing
            }
        } else {
            self.params.block_target_spacing
        };
        prev.timestamp.saturating_add(spacing)
    }

    /// Slot time of the stake block following `prev`.
    pub fn dpos_timestamp(&self, prev: &BlockIndex) -> Option<u32> {
        if !prev.is_primary() {
            return None;
        }
        Some(prev.timestamp.saturating_add(self.params.block_target_spacing))
    }

    pub fn verify_proof_of_work(&self, block: &Block, prev: &BlockIndex) -> ConsensusResult<()> {
        if block.timestamp < self.next_block_timestamp(prev, TxType::Work) {
            return Err(ConsensusError::BlockTimestampOutOfRange(
                "proof-of-work block too early".to_string(),
            ));
        }
        let proof = block.hash_work_proof().ok_or_else(|| {
            ConsensusError::BlockProofOfWorkInvalid("missing hash-work proof".to_string())
        })?;
        if proof.bits != PROOF_OF_WORK_BITS || proof.algo != POW_ALGO_KECCAK {
            return Err(ConsensusError::BlockProofOfWorkInvalid(format!(
                "unexpected algo {} bits {}",
                proof.algo, proof.bits
            )));
        }
        if proof.dest_mint != block.mint_tx.to {
            return Err(ConsensusError::BlockProofOfWorkInvalid(
                "proof mint destination differs from mint".to_string(),
            ));
        }
        if !pow_hash_meets_target(&block.pow_hash(), proof.bits) {
            return Err(ConsensusError::BlockProofOfWorkInvalid(
                "hash above target".to_string(),
            ));
        }
        Ok(())
    }

    pub fn verify_dpos(
        &self,
        block: &Block,
        prev: &BlockIndex,
        agreement: &DelegateAgreement,
    ) -> ConsensusResult<()> {
        if Some(block.timestamp) != self.dpos_timestamp(prev) {
            return Err(ConsensusError::BlockTimestampOutOfRange(format!(
                "stake block at {} after {}",
                block.timestamp, prev.timestamp
            )));
        }
        self.verify_minted_by_leader(block, agreement)
    }

    pub fn verify_subsidiary(
        &self,
        block: &Block,
        prev: &BlockIndex,
        reference: &BlockIndex,
        agreement: &DelegateAgreement,
    ) -> ConsensusResult<()> {
        if block.timestamp <= prev.timestamp {
            return Err(ConsensusError::BlockTimestampOutOfRange(
                "fork block not after its previous block".to_string(),
            ));
        }
        if block.block_type.is_subsidiary() {
            if block.timestamp != reference.timestamp {
                return Err(ConsensusError::BlockTimestampOutOfRange(
                    "subsidiary time differs from its reference".to_string(),
                ));
            }
        } else {
            let slot_end = reference
                .timestamp
                .saturating_add(self.params.block_target_spacing);
            let step = self.params.extended_block_spacing.max(1);
            if block.timestamp <= reference.timestamp
                || block.timestamp >= slot_end
                || (block.timestamp - reference.timestamp) % step != 0
            {
                return Err(ConsensusError::BlockTimestampOutOfRange(format!(
                    "extended block at {} outside slot of {}",
                    block.timestamp, reference.timestamp
                )));
            }
        }
        self.verify_minted_by_leader(block, agreement)
    }

    fn verify_minted_by_leader(
        &self,
        block: &Block,
        agreement: &DelegateAgreement,
    ) -> ConsensusResult<()> {
        if block.mint_tx.to != agreement.ballot(0) {
            return Err(ConsensusError::BlockProofOfStakeInvalid(format!(
                "minted to {}, ballot leader is {}",
                block.mint_tx.to,
                agreement.ballot(0)
            )));
        }
        if block.mint_tx.timestamp != block.timestamp {
            return Err(ConsensusError::BlockTimestampOutOfRange(
                "mint time differs from block time".to_string(),
            ));
        }
        Ok(())
    }

    /// Transaction-level rule set.
    pub fn verify_transaction(&self, tx: &Transaction, ctx: &TxContext<'_>) -> ConsensusResult<()> {
        let cost = tx.amount.saturating_add(tx.fee());
        if ctx.from_state.balance < cost {
            return Err(ConsensusError::TransactionInputInvalid(format!(
                "balance {} below {}",
                ctx.from_state.balance, cost
            )));
        }
        if !ctx.from_state.verify_tx_nonce(tx.nonce) {
            return Err(ConsensusError::MissingPrev(format!(
                "nonce {} after {}",
                tx.nonce, ctx.from_state.nonce
            )));
        }
        if tx.gas_price < U256::from(MIN_GAS_PRICE) {
            return Err(ConsensusError::TransactionInvalid(
                "gas price below minimum".to_string(),
            ));
        }
        let min_gas = TX_BASE_GAS + tx.data_size() as u64 * DATA_GAS_PER_BYTE;
        if tx.gas_limit < min_gas {
            return Err(ConsensusError::TransactionInvalid(format!(
                "gas limit {} below {}",
                tx.gas_limit, min_gas
            )));
        }
        if tx.serialized_size() > MAX_TX_SIZE {
            return Err(ConsensusError::TransactionInvalid("oversize".to_string()));
        }

        if tx.tx_type == TxType::Cert {
            if !tx.to.is_template_of(shared_types::TemplateType::Delegate) {
                return Err(ConsensusError::TransactionInvalid(
                    "cert tx not sent to a delegate".to_string(),
                ));
            }
            if tx.cert_data().is_none() {
                return Err(ConsensusError::TransactionInvalid(
                    "cert tx without cert data".to_string(),
                ));
            }
        }

        let rules = TemplateRuleContext {
            params: &self.params,
            primary_fork: &self.genesis,
        };
        if tx.to.is_template() {
            let to = ctx.to_template.ok_or_else(|| {
                ConsensusError::TransactionInvalid("unknown recipient template".to_string())
            })?;
            to.verify_as_recipient(tx, &rules)?;
        }

        let signer = match &tx.from {
            Destination::PubKey(key) => *key,
            Destination::Template(_) => {
                let from = ctx.from_template.ok_or_else(|| {
                    ConsensusError::TransactionInvalid("unknown sender template".to_string())
                })?;
                from.verify_as_sender(tx)?;
                from.spend_key()
                    .ok_or(ConsensusError::TransactionSignatureInvalid)?
            }
            Destination::Null => {
                return Err(ConsensusError::TransactionInputInvalid(
                    "transfer without sender".to_string(),
                ))
            }
        };
        if tx.fork != *ctx.fork {
            return Err(ConsensusError::TransactionInvalid(
                "transaction of another fork".to_string(),
            ));
        }
        if !verify_hash(&signer, &tx.signature_hash(), &tx.signature) {
            return Err(ConsensusError::TransactionSignatureInvalid);
        }
        Ok(())
    }

    /// Per-block trust delta.
    pub fn get_block_trust(&self, block: &Block, source: TrustSource<'_>) -> ConsensusResult<U256> {
        match block.block_type {
            BlockType::Genesis | BlockType::Origin | BlockType::Vacant => Ok(U256::zero()),
            BlockType::Primary => match source {
                TrustSource::Work => Ok(pow_block_trust(block.height(), &block.mint_tx.to)),
                TrustSource::Stake(enroll_trust) => Ok(enroll_trust),
                _ => Err(ConsensusError::BlockTransactionsInvalid(
                    "primary block trust needs its agreement".to_string(),
                )),
            },
            BlockType::Subsidiary | BlockType::Extended => match source {
                TrustSource::Reference {
                    reference,
                    reference_prev,
                } => Ok(inherited_trust(reference, reference_prev)),
                _ => Err(ConsensusError::BlockTransactionsInvalid(
                    "fork block trust needs its reference".to_string(),
                )),
            },
        }
    }
}

/// Whether `hash` read as a big-endian integer is at most `2^256 >> bits`.
pub fn pow_hash_meets_target(hash: &Hash, bits: u8) -> bool {
    U256::from_big_endian(hash.as_bytes()) <= (U256::MAX >> usize::from(bits))
}
