//! # Checkpoints
//!
//! Trusted `(height, hash)` anchors per fork. A block at a checkpointed
//! height must carry the checkpointed hash, and a node refuses to start on
//! local storage that disagrees with any checkpoint it has reached.

use std::collections::{BTreeMap, HashMap};

use shared_types::Hash;

use crate::params::Checkpoint;

/// Checkpoints indexed by fork and height.
#[derive(Clone, Debug, Default)]
pub struct CheckpointTable {
    by_fork: HashMap<Hash, BTreeMap<u32, Hash>>,
}

impl CheckpointTable {
    pub fn new(checkpoints: &[Checkpoint]) -> Self {
        let mut by_fork: HashMap<Hash, BTreeMap<u32, Hash>> = HashMap::new();
        for cp in checkpoints {
            by_fork.entry(cp.fork).or_default().insert(cp.height, cp.hash);
        }
        Self { by_fork }
    }

    pub fn is_empty(&self) -> bool {
        self.by_fork.is_empty()
    }

    /// False only when a checkpoint exists at `height` with another hash.
    pub fn verify(&self, fork: &Hash, height: u32, hash: &Hash) -> bool {
        self.get(fork, height).map_or(true, |expected| expected == *hash)
    }

    pub fn get(&self, fork: &Hash, height: u32) -> Option<Hash> {
        self.by_fork.get(fork)?.get(&height).copied()
    }

    /// Highest checkpoint at or below `height`.
    pub fn latest_at_or_below(&self, fork: &Hash, height: u32) -> Option<(u32, Hash)> {
        self.by_fork
            .get(fork)?
            .range(..=height)
            .next_back()
            .map(|(h, hash)| (*h, *hash))
    }

    /// All checkpoints of `fork`, lowest first.
    pub fn of_fork(&self, fork: &Hash) -> Vec<(u32, Hash)> {
        self.by_fork
            .get(fork)
            .map(|m| m.iter().map(|(h, hash)| (*h, *hash)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::keccak;

    fn create_table() -> (CheckpointTable, Hash) {
        let fork = keccak(b"fork");
        let table = CheckpointTable::new(&[
            Checkpoint {
                fork,
                height: 0,
                hash: keccak(b"g"),
            },
            Checkpoint {
                fork,
                height: 100,
                hash: keccak(b"100"),
            },
        ]);
        (table, fork)
    }

    #[test]
    fn test_verify_only_checks_anchored_heights() {
        let (table, fork) = create_table();
        assert!(table.verify(&fork, 100, &keccak(b"100")));
        assert!(!table.verify(&fork, 100, &keccak(b"other")));
        assert!(table.verify(&fork, 50, &keccak(b"anything")));
        assert!(table.verify(&keccak(b"unknown"), 100, &keccak(b"x")));
    }

    #[test]
    fn test_latest_at_or_below() {
        let (table, fork) = create_table();
        assert_eq!(table.latest_at_or_below(&fork, 99).map(|c| c.0), Some(0));
        assert_eq!(table.latest_at_or_below(&fork, 250).map(|c| c.0), Some(100));
        assert_eq!(table.of_fork(&fork).len(), 2);
    }
}
