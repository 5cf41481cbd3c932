//! Delegate enrollment secrets.
//!
//! A delegate commits to `keccak(secret)` in its CERT transaction and
//! reveals `secret` when it produces the block the enrollment targets.
//! Secrets are derived from the delegate key and the enrollment height so a
//! restarted node can recompute them.

use std::collections::HashMap;

use ed25519_dalek::SigningKey;
use hc_01_consensus::{DelegateEnrolled, PublishedShares};
use parking_lot::RwLock;
use shared_types::crypto::sign_hash;
use shared_types::{keccak, CertData, Destination, Hash};

#[derive(Debug, Default)]
pub struct SecretStore {
    /// commitment -> (delegate, secret)
    secrets: RwLock<HashMap<Hash, (Destination, Hash)>>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive_secret(key: &SigningKey, enroll_height: u32) -> Hash {
        let seed = keccak(&enroll_height.to_be_bytes());
        keccak(&sign_hash(key, &seed))
    }

    /// Enrollment data for `delegate` at `enroll_height`; the secret is kept.
    pub fn commit(&self, key: &SigningKey, delegate: Destination, enroll_height: u32) -> CertData {
        let secret = Self::derive_secret(key, enroll_height);
        let commitment = keccak(secret.as_bytes());
        self.secrets.write().insert(commitment, (delegate, secret));
        CertData {
            enroll_height,
            commitment,
        }
    }

    /// Secrets opening the commitments of `enrolled` this store knows.
    pub fn reveal(&self, enrolled: &DelegateEnrolled) -> PublishedShares {
        let secrets = self.secrets.read();
        let shares = enrolled
            .enroll_data
            .iter()
            .filter_map(|(dest, commitment)| match secrets.get(commitment) {
                Some((owner, secret)) if owner == dest => Some((*dest, *secret)),
                _ => None,
            })
            .collect();
        PublishedShares { shares }
    }

    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }
}
