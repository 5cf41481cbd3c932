//! Delegate secret-share verification.
//!
//! Enrollment publishes a commitment `keccak(secret)` per delegate in a CERT
//! transaction. The producer of a primary block reveals the secrets it
//! collected for that height in its [`ProofOfDelegate`]. The agreement hash
//! is the keccak of the revealed secrets in canonical destination order and
//! the weight is the number of delegates revealed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared_types::{decode, encode, keccak, keccak_concat, Destination, Hash, ProofOfDelegate};

use super::agreement::DelegateEnrolled;
use crate::params::MAX_DELEGATE_THRESH;

/// Secrets revealed by delegates for one height.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedShares {
    pub shares: BTreeMap<Destination, Hash>,
}

impl PublishedShares {
    pub fn encode(&self) -> Vec<u8> {
        if self.shares.is_empty() {
            return Vec::new();
        }
        encode(self)
    }

    /// Agreement hash over the revealed secrets.
    pub fn agreement(&self) -> Hash {
        if self.shares.is_empty() {
            return Hash::zero();
        }
        keccak_concat(self.shares.values().map(|s| s.as_bytes()))
    }

    /// Delegate proof publishing these shares.
    pub fn to_proof(&self) -> ProofOfDelegate {
        ProofOfDelegate {
            weight: self.shares.len().min(u8::MAX as usize) as u8,
            agreement: self.agreement(),
            published: self.encode(),
        }
    }
}

/// Verified outcome of a delegate proof.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedProof {
    pub agreement: Hash,
    pub weight: usize,
    /// Delegates that revealed a valid secret.
    pub ballot_set: Vec<Destination>,
}

/// Verifies delegate proofs against one enrollment snapshot.
pub struct DelegateVerify<'a> {
    enrolled: &'a DelegateEnrolled,
}

impl<'a> DelegateVerify<'a> {
    pub fn new(enrolled: &'a DelegateEnrolled) -> Self {
        Self { enrolled }
    }

    pub fn verify_proof(&self, proof: &ProofOfDelegate) -> Result<VerifiedProof, String> {
        if proof.published.is_empty() {
            if !proof.agreement.is_zero() || proof.weight != 0 {
                return Err("agreement without published shares".to_string());
            }
            return Ok(VerifiedProof::default());
        }

        let published: PublishedShares =
            decode("published shares", &proof.published).map_err(|e| e.to_string())?;
        if published.shares.len() > MAX_DELEGATE_THRESH {
            return Err(format!("too many shares: {}", published.shares.len()));
        }
        for (dest, secret) in &published.shares {
            let commitment = self
                .enrolled
                .enroll_data
                .get(dest)
                .ok_or_else(|| format!("share from unenrolled delegate {}", dest))?;
            if keccak(secret.as_bytes()) != *commitment {
                return Err(format!("share does not open commitment of {}", dest));
            }
        }

        let agreement = published.agreement();
        let weight = published.shares.len();
        if proof.agreement != agreement || usize::from(proof.weight) != weight {
            return Err("agreement header does not match shares".to_string());
        }

        Ok(VerifiedProof {
            agreement,
            weight,
            ballot_set: published.shares.keys().copied().collect(),
        })
    }
}
