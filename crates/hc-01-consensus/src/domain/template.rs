//! Template addresses.
//!
//! A template destination is `(kind, keccak(data))`. The data decodes into a
//! [`TemplateKind`], and every per-template rule is an exhaustive match on
//! it: adding a kind forces a decision in each rule.

use serde::{Deserialize, Serialize};
use shared_types::{
    decode, encode, Destination, Hash, TemplateId, TemplateType, Transaction, H256,
};

use super::error::{ConsensusError, ConsensusResult};
use crate::params::ConsensusParams;

/// Who receives the vote reward of a vote template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardMode {
    /// Paid back into the vote template itself.
    Vote,
    /// Paid to the owner.
    Owner,
}

/// Decoded template data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateKind {
    Delegate {
        /// Block signing key.
        delegate: H256,
        owner: Destination,
        /// Commission kept by the delegate, out of `MINT_REWARD_PER`.
        reward_ratio: u32,
    },
    Vote {
        delegate: Destination,
        owner: Destination,
        reward_mode: RewardMode,
    },
    Pledge {
        delegate: Destination,
        owner: Destination,
        cycles: u32,
    },
    Fork {
        redeem: Destination,
        fork: Hash,
    },
    ActivateCode {
        grant: Destination,
    },
    Redeem {
        owner: Destination,
    },
    Proof {
        /// Mint signing key.
        mint: H256,
    },
}

/// Context the template rules need.
pub struct TemplateRuleContext<'a> {
    pub params: &'a ConsensusParams,
    pub primary_fork: &'a Hash,
}

impl TemplateKind {
    pub fn template_type(&self) -> TemplateType {
        match self {
            TemplateKind::Delegate { .. } => TemplateType::Delegate,
            TemplateKind::Vote { .. } => TemplateType::Vote,
            TemplateKind::Pledge { .. } => TemplateType::Pledge,
            TemplateKind::Fork { .. } => TemplateType::Fork,
            TemplateKind::ActivateCode { .. } => TemplateType::ActivateCode,
            TemplateKind::Redeem { .. } => TemplateType::Redeem,
            TemplateKind::Proof { .. } => TemplateType::Proof,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }

    /// Decodes `data` and checks it hashes to `tid`.
    pub fn decode_for(tid: &TemplateId, data: &[u8]) -> ConsensusResult<Self> {
        let kind: TemplateKind = decode("template data", data)
            .map_err(|e| ConsensusError::TransactionInvalid(e.to_string()))?;
        if kind.template_id() != *tid {
            return Err(ConsensusError::TransactionInvalid(
                "template id mismatch".to_string(),
            ));
        }
        Ok(kind)
    }

    pub fn template_id(&self) -> TemplateId {
        TemplateId::from_data(self.template_type(), &self.encode())
    }

    pub fn destination(&self) -> Destination {
        Destination::Template(self.template_id())
    }

    /// Key that authorizes spending from the template.
    pub fn spend_key(&self) -> Option<H256> {
        let owner = match self {
            TemplateKind::Delegate { owner, .. }
            | TemplateKind::Vote { owner, .. }
            | TemplateKind::Pledge { owner, .. }
            | TemplateKind::Redeem { owner } => owner,
            TemplateKind::Fork { redeem, .. } => redeem,
            TemplateKind::ActivateCode { grant } => grant,
            TemplateKind::Proof { mint } => return Some(*mint),
        };
        match owner {
            Destination::PubKey(key) => Some(*key),
            _ => None,
        }
    }

    /// Key that signs blocks minted to the template.
    pub fn mint_key(&self) -> Option<H256> {
        match self {
            TemplateKind::Delegate { delegate, .. } => Some(*delegate),
            TemplateKind::Proof { mint } => Some(*mint),
            TemplateKind::Vote { .. }
            | TemplateKind::Pledge { .. }
            | TemplateKind::Fork { .. }
            | TemplateKind::ActivateCode { .. }
            | TemplateKind::Redeem { .. } => None,
        }
    }

    /// Delegate a vote or pledge template counts toward.
    pub fn voted_delegate(&self) -> Option<Destination> {
        match self {
            TemplateKind::Vote { delegate, .. } | TemplateKind::Pledge { delegate, .. } => {
                Some(*delegate)
            }
            TemplateKind::Delegate { .. } => Some(self.destination()),
            _ => None,
        }
    }

    /// Rules for a transaction paying into this template.
    pub fn verify_as_recipient(
        &self,
        tx: &Transaction,
        ctx: &TemplateRuleContext<'_>,
    ) -> ConsensusResult<()> {
        let primary_only = |what: &str| {
            if tx.fork != *ctx.primary_fork {
                return Err(ConsensusError::TransactionInvalid(format!(
                    "{} template tx off the primary chain",
                    what
                )));
            }
            Ok(())
        };
        match self {
            TemplateKind::Vote { .. } | TemplateKind::Pledge { .. } => {
                primary_only(self.template_type().name())?;
                if tx.amount < ctx.params.min_vote_amount {
                    return Err(ConsensusError::TransactionInvalid(
                        "vote amount below minimum".to_string(),
                    ));
                }
                Ok(())
            }
            TemplateKind::Fork { .. } => {
                primary_only("fork")?;
                if tx.amount < ctx.params.mortgage_base {
                    return Err(ConsensusError::TransactionInvalid(
                        "fork mortgage below base".to_string(),
                    ));
                }
                Ok(())
            }
            TemplateKind::Redeem { .. } => primary_only("redeem"),
            TemplateKind::Delegate { .. }
            | TemplateKind::ActivateCode { .. }
            | TemplateKind::Proof { .. } => Ok(()),
        }
    }

    /// Rules for a transaction spending from this template.
    pub fn verify_as_sender(&self, tx: &Transaction) -> ConsensusResult<()> {
        match self {
            TemplateKind::Vote { .. } | TemplateKind::Pledge { .. } => {
                if !tx.to.is_template_of(TemplateType::Redeem) {
                    return Err(ConsensusError::TransactionInvalid(
                        "vote funds may only move to a redeem template".to_string(),
                    ));
                }
                Ok(())
            }
            TemplateKind::Fork { redeem, .. } => {
                if tx.to != *redeem {
                    return Err(ConsensusError::TransactionInvalid(
                        "fork mortgage may only return to its redeem address".to_string(),
                    ));
                }
                Ok(())
            }
            TemplateKind::Delegate { .. }
            | TemplateKind::ActivateCode { .. }
            | TemplateKind::Redeem { .. }
            | TemplateKind::Proof { .. } => Ok(()),
        }
    }
}
