//! ed25519 signing helpers.
//!
//! Public keys are stored as 32-byte `H256` values inside
//! [`Destination::PubKey`](crate::Destination::PubKey).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use primitive_types::H256;

use crate::entities::Hash;

/// Builds a signing key from 32 secret bytes.
pub fn signing_key_from_seed(seed: &[u8; 32]) -> SigningKey {
    SigningKey::from_bytes(seed)
}

/// Public key of `key` as it appears in a destination.
pub fn public_key_of(key: &SigningKey) -> H256 {
    H256::from(key.verifying_key().to_bytes())
}

/// Signs a 32-byte digest.
pub fn sign_hash(key: &SigningKey, hash: &Hash) -> Vec<u8> {
    key.sign(hash.as_bytes()).to_bytes().to_vec()
}

/// Verifies `signature` over `hash` against the raw public key.
pub fn verify_hash(public_key: &H256, hash: &Hash, signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key.as_fixed_bytes()) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(hash.as_bytes(), &sig).is_ok()
}
