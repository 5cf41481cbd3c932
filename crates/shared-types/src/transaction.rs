//! Transactions carried by blocks.

use std::collections::BTreeMap;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::crypto::sign_hash;
use crate::destination::Destination;
use crate::entities::{keccak, Amount, Hash};

/// Transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    /// Ordinary value transfer.
    Token,
    /// Delegate enrollment certificate.
    Cert,
    /// Mint of a proof-of-stake block.
    Stake,
    /// Mint of a proof-of-work block.
    Work,
    /// Mint of the genesis or an origin block.
    Genesis,
    /// Vote reward payout.
    VoteReward,
}

impl TxType {
    /// Types that may only appear as a block's mint transaction.
    pub fn is_mint(&self) -> bool {
        matches!(self, TxType::Stake | TxType::Work | TxType::Genesis)
    }

    pub fn is_reward(&self) -> bool {
        matches!(self, TxType::VoteReward)
    }
}

/// Keys of the typed attachments a transaction can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxDataKey {
    /// [`CertData`] of an enrollment.
    CertData,
    /// Serialized template of `to` or `from`.
    TemplateData,
    /// Vote reward share of a reward payout.
    VoteReward,
    /// Fees collected by a mint.
    MintCoin,
    /// Block reward collected by a mint.
    MintReward,
    /// Free-form memo.
    Memo,
}

/// Enrollment certificate payload: a delegate commits to a secret it will
/// reveal when publishing its share for the target height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertData {
    pub enroll_height: u32,
    pub commitment: Hash,
}

impl CertData {
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        bincode::deserialize(data).ok()
    }
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_type: TxType,
    /// Fork the transaction belongs to.
    pub fork: Hash,
    pub timestamp: u32,
    pub nonce: u64,
    pub from: Destination,
    pub to: Destination,
    pub amount: Amount,
    pub gas_price: Amount,
    pub gas_limit: u64,
    pub data: BTreeMap<TxDataKey, Vec<u8>>,
    pub signature: Vec<u8>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            tx_type: TxType::Token,
            fork: Hash::zero(),
            timestamp: 0,
            nonce: 0,
            from: Destination::Null,
            to: Destination::Null,
            amount: Amount::zero(),
            gas_price: Amount::zero(),
            gas_limit: 0,
            data: BTreeMap::new(),
            signature: Vec::new(),
        }
    }
}

impl Transaction {
    /// Fee paid by the sender.
    pub fn fee(&self) -> Amount {
        self.gas_price * Amount::from(self.gas_limit)
    }

    /// Transaction id, covering the signature.
    pub fn hash(&self) -> Hash {
        keccak(&self.encode())
    }

    /// Digest the sender signs.
    pub fn signature_hash(&self) -> Hash {
        let unsigned = Transaction {
            signature: Vec::new(),
            ..self.clone()
        };
        keccak(&unsigned.encode())
    }

    /// Bincode encoding.
    pub fn encode(&self) -> Vec<u8> {
        // In-memory encoding of these types cannot fail.
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn serialized_size(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(u64::MAX) as usize
    }

    /// Total bytes of attached data, used for gas accounting.
    pub fn data_size(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    pub fn data(&self, key: TxDataKey) -> Option<&[u8]> {
        self.data.get(&key).map(Vec::as_slice)
    }

    pub fn add_data(&mut self, key: TxDataKey, value: Vec<u8>) {
        self.data.insert(key, value);
    }

    pub fn cert_data(&self) -> Option<CertData> {
        self.data(TxDataKey::CertData).and_then(CertData::decode)
    }

    pub fn sign(&mut self, key: &SigningKey) {
        self.signature = sign_hash(key, &self.signature_hash());
    }
}
