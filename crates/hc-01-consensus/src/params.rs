//! Consensus parameters.
//!
//! One immutable [`ConsensusParams`] is built at startup (from the network
//! presets or a deserialized config) and shared as `Arc<ConsensusParams>`
//! by the validator, the vote reward distributor and the block maker.

use serde::Deserialize;
use shared_types::{coin, Amount, Hash, COIN, U256};

/// Maximum serialized block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 2_000_000;
/// Maximum serialized transaction size in bytes.
pub const MAX_TX_SIZE: usize = 100_000;
/// Seconds a block timestamp may run ahead of the local clock.
pub const MAX_CLOCK_DRIFT: u32 = 80;
/// Minimum accepted gas price.
pub const MIN_GAS_PRICE: u64 = 1_000_000_000_000;
/// Gas every transaction pays before data.
pub const TX_BASE_GAS: u64 = 10_000;
/// Gas per byte of attached data.
pub const DATA_GAS_PER_BYTE: u64 = 50;
/// Proof-of-work difficulty in leading zero bits.
pub const PROOF_OF_WORK_BITS: u8 = 8;
/// Denominator of reward ratios.
pub const MINT_REWARD_PER: u32 = 10_000;
/// Maximum delegates revealing in one agreement.
pub const MAX_DELEGATE_THRESH: usize = 27;
/// Calc-end entries the vote reward cache keeps per fork.
pub const MAX_CACHE_DISTRIBUTE_VOTE_REWARD_BLOCK_COUNT: usize = 8;

/// Initial primary chain supply.
pub fn bbcp_token_init() -> Amount {
    coin(1_050_000)
}

/// Primary chain block reward before halving, 0.79 coin.
pub fn bbcp_reward_init() -> Amount {
    U256::from(COIN) * U256::from(79u64) / U256::from(100u64)
}

/// Network preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

/// A trusted (height, hash) anchor on a fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Checkpoint {
    pub fork: Hash,
    pub height: u32,
    pub hash: Hash,
}

/// Consensus constants for one network.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusParams {
    pub network: Network,
    /// Seconds between primary blocks.
    pub block_target_spacing: u32,
    /// Seconds between consecutive proof-of-work blocks.
    pub pow_block_spacing: u32,
    /// Seconds between extended blocks.
    pub extended_block_spacing: u32,
    /// Blocks per day; also the vote reward distribution period.
    pub day_height: u32,
    pub distribute_interval: u32,
    pub enroll_interval: u32,
    pub enroll_maximum_amount: Amount,
    pub enroll_minimum_amount: Amount,
    pub enroll_trust_amount: Amount,
    pub unit_amount: Amount,
    pub min_vote_amount: Amount,
    pub mortgage_base: Amount,
    pub vote_redeem_lock_days: u32,
    /// Share of each block reward skimmed for the foundation, out of
    /// [`MINT_REWARD_PER`]. Zero disables the skim.
    #[serde(default)]
    pub foundation_reward_ratio: u32,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

impl ConsensusParams {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            block_target_spacing: 30,
            pow_block_spacing: 30,
            extended_block_spacing: 1,
            day_height: 2880,
            distribute_interval: 5,
            enroll_interval: 10,
            enroll_maximum_amount: coin(1_000_000),
            vote_redeem_lock_days: 100,
            ..Self::common(Network::Mainnet)
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            block_target_spacing: 10,
            pow_block_spacing: 10,
            extended_block_spacing: 1,
            day_height: 10,
            distribute_interval: 3,
            enroll_interval: 6,
            enroll_maximum_amount: bbcp_token_init(),
            vote_redeem_lock_days: 10,
            ..Self::common(Network::Testnet)
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
        }
    }

    fn common(network: Network) -> Self {
        Self {
            network,
            block_target_spacing: 0,
            pow_block_spacing: 0,
            extended_block_spacing: 1,
            day_height: 0,
            distribute_interval: 0,
            enroll_interval: 0,
            enroll_maximum_amount: Amount::zero(),
            enroll_minimum_amount: coin(10_000),
            enroll_trust_amount: coin(100_000),
            unit_amount: coin(10),
            min_vote_amount: coin(1),
            mortgage_base: coin(10_000),
            vote_redeem_lock_days: 0,
            foundation_reward_ratio: 0,
            checkpoints: Vec::new(),
        }
    }

    /// Blocks between the start of an enrollment window and its target.
    pub fn consensus_interval(&self) -> u32 {
        self.enroll_interval + self.distribute_interval + 1
    }

    pub fn vote_reward_distribute_height(&self) -> u32 {
        self.day_height
    }

    /// Primary reward halving cycle, six years of blocks.
    pub fn halve_cycle(&self) -> u32 {
        self.day_height * 365 * 6
    }

    pub fn redeem_lock_height(&self) -> u32 {
        self.vote_redeem_lock_days * self.day_height
    }

    /// Cert transactions one delegate may submit per enrollment window.
    pub fn max_cert_tx_count(&self) -> u32 {
        (self.enroll_interval * 4 / 3).max(1)
    }

    /// Extended block slots inside one primary spacing.
    pub fn extended_slots(&self) -> u32 {
        self.block_target_spacing / self.extended_block_spacing.max(1)
    }
}
