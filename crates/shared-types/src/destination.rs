//! Destinations: the account identifiers transactions move value between.
//!
//! The derived `Ord` is the canonical destination ordering. Every map keyed
//! by destination (ballots, vote ledgers, reward tables) iterates in this
//! order, which keeps consensus computations bit-reproducible.

use std::fmt;

use primitive_types::H256;
use serde::{Deserialize, Serialize};

use crate::entities::{keccak, Hash};

/// Kind of a template address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TemplateType {
    /// Block producing delegate.
    Delegate,
    /// Vote cast for a delegate.
    Vote,
    /// Pledge locked with a delegate.
    Pledge,
    /// Fork creation mortgage.
    Fork,
    /// Code activation grant.
    ActivateCode,
    /// Matured vote redemption.
    Redeem,
    /// Proof-of-work mint address.
    Proof,
}

impl TemplateType {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            TemplateType::Delegate => "delegate",
            TemplateType::Vote => "vote",
            TemplateType::Pledge => "pledge",
            TemplateType::Fork => "fork",
            TemplateType::ActivateCode => "activatecode",
            TemplateType::Redeem => "redeem",
            TemplateType::Proof => "proof",
        }
    }
}

/// Identifier of a template address: its kind and the hash of its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TemplateId {
    pub kind: TemplateType,
    pub id: Hash,
}

impl TemplateId {
    /// Builds the id for serialized template `data`.
    pub fn from_data(kind: TemplateType, data: &[u8]) -> Self {
        Self {
            kind,
            id: keccak(data),
        }
    }
}

/// An account identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Destination {
    /// No destination (minting source, burn target).
    #[default]
    Null,
    /// A plain ed25519 public key.
    PubKey(H256),
    /// A template address.
    Template(TemplateId),
}

impl Destination {
    pub fn is_null(&self) -> bool {
        matches!(self, Destination::Null)
    }

    pub fn is_template(&self) -> bool {
        matches!(self, Destination::Template(_))
    }

    pub fn template_id(&self) -> Option<&TemplateId> {
        match self {
            Destination::Template(tid) => Some(tid),
            _ => None,
        }
    }

    pub fn template_type(&self) -> Option<TemplateType> {
        self.template_id().map(|tid| tid.kind)
    }

    /// True when this is a template of `kind`.
    pub fn is_template_of(&self, kind: TemplateType) -> bool {
        self.template_type() == Some(kind)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Null => write!(f, "null"),
            Destination::PubKey(key) => write!(f, "pubkey:{:x}", key),
            Destination::Template(tid) => write!(f, "{}:{:x}", tid.kind.name(), tid.id),
        }
    }
}
