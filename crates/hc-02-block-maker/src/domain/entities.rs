//! Block maker entities and timing constants.

use ed25519_dalek::SigningKey;
use hc_01_consensus::{BlockIndex, DelegateAgreement, PublishedShares, TemplateKind};
use shared_types::crypto::public_key_of;
use shared_types::{Block, CertData, Destination, Hash, TxType};

use super::secrets::SecretStore;

/// Hashes computed per batch before the first tuning step.
pub const INITIAL_HASH_RATE: u64 = 8;

/// Seconds before the slot time at which an agreement is acted on.
pub const WAIT_AGREEMENT_TIME_OFFSET: i64 = -5;

/// Seconds after the reference block a subsidiary still waits for the last
/// extended block of the previous slot.
pub const WAIT_LAST_EXTENDED_TIME: i64 = 0;

/// Lag in primary heights past which a fork counts as missing blocks.
pub const FORK_LAST_BLOCK_COUNT: u32 = 30;

/// Primary heights a missing fork waits before vacant blocks are replenished.
pub const FORK_WAIT_BLOCK_COUNT: u32 = 60;

/// Lag step that lengthens the wait by another `FORK_WAIT_BLOCK_COUNT`.
pub const FORK_WAIT_BLOCK_SECT: u32 = 100_000;

/// Seconds the proof-of-work task waits after start.
pub const POW_START_DELAY: i64 = 5;

/// Longest wait for a new primary block: one slot plus a margin.
pub fn wait_new_block_time(block_target_spacing: u32) -> i64 {
    i64::from(block_target_spacing) + 5
}

/// Snapshot of the primary chain tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipStatus {
    pub hash: Hash,
    pub prev: Hash,
    pub timestamp: u32,
    pub height: u32,
    pub number: u64,
    pub mint_type: TxType,
}

impl Default for TipStatus {
    fn default() -> Self {
        Self {
            hash: Hash::zero(),
            prev: Hash::zero(),
            timestamp: 0,
            height: 0,
            number: 0,
            mint_type: TxType::Genesis,
        }
    }
}

impl From<&BlockIndex> for TipStatus {
    fn from(index: &BlockIndex) -> Self {
        Self {
            hash: index.hash,
            prev: index.prev,
            timestamp: index.timestamp,
            height: index.height,
            number: index.number,
            mint_type: index.mint_type,
        }
    }
}

/// Consensus input for the block after `prev`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementBlock {
    pub prev: Hash,
    pub prev_time: u32,
    pub prev_height: u32,
    pub prev_number: u64,
    pub prev_mint_type: TxType,
    pub agreement: DelegateAgreement,
    /// Secrets the producer publishes in its delegate proof.
    pub shares: PublishedShares,
    /// Seconds until the slot, non-positive once it has begun.
    pub wait_time: i64,
}

/// Answer of the consensus engine to a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextConsensus {
    /// The agreement for the next height is ready.
    Ready(AgreementBlock),
    /// Nothing to do for `wait_time` seconds.
    Wait {
        prev: Hash,
        prev_height: u32,
        wait_time: i64,
    },
}

impl NextConsensus {
    pub fn wait_time(&self) -> i64 {
        match self {
            NextConsensus::Ready(block) => block.wait_time,
            NextConsensus::Wait { wait_time, .. } => *wait_time,
        }
    }
}

/// A proof-of-work block waiting for its nonce.
#[derive(Debug, Clone)]
pub struct WorkTemplate {
    pub block: Block,
    pub prev: Hash,
    pub prev_height: u32,
    pub bits: u8,
}

/// Keys and mint destination a block is produced with.
pub struct MakerProfile {
    key: SigningKey,
    template: Option<TemplateKind>,
    destination: Destination,
}

impl MakerProfile {
    /// Delegate profile minting to the delegate template of `key`.
    pub fn delegate(key: SigningKey, owner: Destination, reward_ratio: u32) -> Self {
        let template = TemplateKind::Delegate {
            delegate: public_key_of(&key),
            owner,
            reward_ratio,
        };
        Self {
            destination: template.destination(),
            template: Some(template),
            key,
        }
    }

    /// Work profile minting to a proof template of `key`.
    pub fn proof_template(key: SigningKey) -> Self {
        let template = TemplateKind::Proof {
            mint: public_key_of(&key),
        };
        Self {
            destination: template.destination(),
            template: Some(template),
            key,
        }
    }

    /// Work profile minting straight to the public key.
    pub fn pubkey(key: SigningKey) -> Self {
        Self {
            destination: Destination::PubKey(public_key_of(&key)),
            template: None,
            key,
        }
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn template(&self) -> Option<&TemplateKind> {
        self.template.as_ref()
    }

    /// Serialized template data, for a mint transaction that introduces it.
    pub fn template_data(&self) -> Option<Vec<u8>> {
        self.template.as_ref().map(TemplateKind::encode)
    }

    /// Bytes the block signature adds.
    pub fn signature_size(&self) -> usize {
        ed25519_dalek::SIGNATURE_LENGTH
    }

    pub fn sign(&self, block: &mut Block) {
        block.sign(&self.key);
    }

    /// Commits this delegate's secret for `enroll_height` in `secrets`.
    pub fn enrollment(&self, secrets: &SecretStore, enroll_height: u32) -> CertData {
        secrets.commit(&self.key, self.destination, enroll_height)
    }
}

impl std::fmt::Debug for MakerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MakerProfile")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}
