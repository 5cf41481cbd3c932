//! Delegate enrollment snapshots, agreements and ballot derivation.
//!
//! ```text
//!  enroll window (E blocks)   distribute (D blocks)   target
//! |-------------------------|-----------------------|--------|
//!  CERT txs commit secrets    shares are exchanged    the producer
//!                                                      publishes them
//! ```

use std::collections::{BTreeMap, BTreeSet};

use shared_types::{Amount, Destination, Hash};

use crate::params::ConsensusParams;

/// Delegates enrolled for one window, keyed by the window's anchor block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateEnrolled {
    /// Unit weight of each enrolled delegate.
    pub weights: BTreeMap<Destination, u64>,
    /// Enrollment commitment of each delegate.
    pub enroll_data: BTreeMap<Destination, Hash>,
    /// Vote amount of each enrolled delegate at the anchor.
    pub vote_amounts: Vec<(Destination, Amount)>,
}

impl DelegateEnrolled {
    pub fn is_empty(&self) -> bool {
        self.enroll_data.is_empty()
    }
}

/// Consensus outcome for one primary height.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateAgreement {
    pub agreement: Hash,
    pub weight: usize,
    /// `ballot[0]` produces the block. Empty means proof of work.
    pub ballot: Vec<Destination>,
}

impl DelegateAgreement {
    pub fn is_proof_of_work(&self) -> bool {
        self.ballot.is_empty()
    }

    /// Ballot entry `i`, or the null destination.
    pub fn ballot(&self, i: usize) -> Destination {
        self.ballot.get(i).copied().unwrap_or_default()
    }
}

/// XOR of the eight big-endian 32-bit words of `hash`.
pub fn agreement_selector(hash: &Hash) -> u32 {
    hash.as_bytes()
        .chunks(4)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0, |acc, w| acc ^ w)
}

/// Derives the ballot for `agreement` from the delegates that revealed
/// (`ballot_set`) and their enrolled vote amounts.
///
/// Returns the ballot and the enroll trust (sum of clamped vote amounts).
/// The walk is in canonical destination order.
pub fn get_delegated_ballot(
    params: &ConsensusParams,
    agreement: &Hash,
    ballot_set: &[Destination],
    vote_amounts: &[(Destination, Amount)],
) -> (Vec<Destination>, Amount) {
    if agreement.is_zero() || ballot_set.is_empty() {
        return (Vec::new(), Amount::zero());
    }
    let revealed: BTreeSet<&Destination> = ballot_set.iter().collect();

    let mut candidates: BTreeMap<Destination, u64> = BTreeMap::new();
    let mut total_weight: u64 = 0;
    let mut enroll_trust = Amount::zero();
    for (dest, amount) in vote_amounts {
        if !revealed.contains(dest) {
            continue;
        }
        let clamped = (*amount).min(params.enroll_maximum_amount);
        let weight = (clamped / params.unit_amount).low_u64();
        enroll_trust = enroll_trust.saturating_add(clamped);
        total_weight += weight;
        *candidates.entry(*dest).or_default() += weight;
    }
    if total_weight == 0 {
        return (Vec::new(), Amount::zero());
    }

    let mut n = u64::from(agreement_selector(agreement)) % total_weight;
    let mut leader = None;
    for (dest, weight) in &candidates {
        if n < *weight {
            leader = Some(*dest);
            break;
        }
        n -= weight;
    }
    let Some(leader) = leader else {
        return (Vec::new(), Amount::zero());
    };

    let mut ballot = vec![leader];
    ballot.extend(
        candidates
            .iter()
            .filter(|(d, w)| **d != leader && **w > 0)
            .map(|(d, _)| *d),
    );
    (ballot, enroll_trust)
}
