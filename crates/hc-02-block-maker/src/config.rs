//! Configuration types for the block maker

use serde::Deserialize;
use shared_types::crypto::signing_key_from_seed;
use shared_types::{Destination, Hash};

use crate::domain::{MakerProfile, INITIAL_HASH_RATE};
use crate::error::{BlockMakerError, Result};

/// Which blocks this node makes.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Primary blocks, plus fork blocks for the forks it follows.
    #[default]
    Common,
    /// Same production as `Common`, for nodes that follow every fork.
    Super,
    /// Fork blocks only, driven by primary blocks received from a peer.
    Fork,
}

/// Runtime configuration for the block maker
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BlockMakerConfig {
    pub mode: NodeMode,

    /// Delegates this node produces for.
    pub delegates: Vec<DelegateProfileConfig>,

    /// Proof-of-work miner, if any.
    pub pow: Option<PowProfileConfig>,

    /// Produce for every fork the chain knows. Otherwise only for `forks`.
    pub all_forks: bool,

    pub forks: Vec<Hash>,

    /// Hashes per batch of the first proof-of-work search.
    pub initial_hash_rate: u64,

    /// Fill primary spacings with extended blocks when transactions wait.
    pub extended_blocks: bool,
}

impl Default for BlockMakerConfig {
    fn default() -> Self {
        Self {
            mode: NodeMode::Common,
            delegates: Vec::new(),
            pow: None,
            all_forks: true,
            forks: Vec::new(),
            initial_hash_rate: INITIAL_HASH_RATE,
            extended_blocks: true,
        }
    }
}

/// A delegate key and the template it mints to.
#[derive(Clone, Debug, Deserialize)]
pub struct DelegateProfileConfig {
    /// Hex encoded 32-byte key seed.
    pub key_seed: String,
    pub owner: Destination,
    /// Commission out of 10000.
    pub reward_ratio: u32,
}

/// Proof-of-work mint key.
#[derive(Clone, Debug, Deserialize)]
pub struct PowProfileConfig {
    /// Hex encoded 32-byte key seed.
    pub key_seed: String,
    /// Mint to a proof template instead of the plain key.
    #[serde(default)]
    pub use_template: bool,
}

fn parse_seed(seed: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(seed.trim_start_matches("0x"))
        .map_err(|e| BlockMakerError::InvalidKey(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| BlockMakerError::InvalidKey(format!("seed is {} bytes, want 32", b.len())))
}

impl DelegateProfileConfig {
    pub fn to_profile(&self) -> Result<MakerProfile> {
        if self.owner.is_null() {
            return Err(BlockMakerError::InvalidConfig(
                "delegate owner must not be null".to_string(),
            ));
        }
        if self.reward_ratio > hc_01_consensus::params::MINT_REWARD_PER {
            return Err(BlockMakerError::InvalidConfig(format!(
                "reward ratio {} above {}",
                self.reward_ratio,
                hc_01_consensus::params::MINT_REWARD_PER
            )));
        }
        let key = signing_key_from_seed(&parse_seed(&self.key_seed)?);
        Ok(MakerProfile::delegate(key, self.owner, self.reward_ratio))
    }
}

impl PowProfileConfig {
    pub fn to_profile(&self) -> Result<MakerProfile> {
        let key = signing_key_from_seed(&parse_seed(&self.key_seed)?);
        Ok(if self.use_template {
            MakerProfile::proof_template(key)
        } else {
            MakerProfile::pubkey(key)
        })
    }
}

impl BlockMakerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mode == NodeMode::Fork && !self.all_forks && self.forks.is_empty() {
            return Err(BlockMakerError::InvalidConfig(
                "fork mode without any fork to produce for".to_string(),
            ));
        }
        if self.initial_hash_rate == 0 {
            return Err(BlockMakerError::InvalidConfig(
                "initial hash rate must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether blocks for `fork` are made here. Super nodes make them for
    /// every fork.
    pub fn allows_fork(&self, fork: &Hash) -> bool {
        self.mode == NodeMode::Super || self.all_forks || self.forks.contains(fork)
    }
}
