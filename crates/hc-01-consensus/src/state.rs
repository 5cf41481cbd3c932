//! Memoization state of the block chain service.
//!
//! All caches are derived data: dropping any entry only costs a
//! recomputation.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use shared_types::{Hash, ProofOfPiggyback, Transaction};

use crate::domain::{DelegateAgreement, DelegateEnrolled};
use crate::params::MAX_CACHE_DISTRIBUTE_VOTE_REWARD_BLOCK_COUNT;

pub const AGREEMENT_CACHE_CAPACITY: usize = 16;
pub const ENROLLED_CACHE_CAPACITY: usize = 120;
pub const PIGGYBACK_CACHE_CAPACITY: usize = 2560;

/// Hit/miss counters of one cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// A bounded LRU keyed by block hash.
pub struct BlockCache<T> {
    inner: Mutex<LruCache<Hash, T>>,
    stats: CacheStats,
    name: &'static str,
}

impl<T: Clone> BlockCache<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            stats: CacheStats::default(),
            name,
        }
    }

    pub fn get(&self, hash: &Hash) -> Option<T> {
        let found = self.inner.lock().get(hash).cloned();
        match found {
            Some(_) => {
                self.stats.hit();
                crate::metrics::record_cache_lookup(self.name, true);
            }
            None => {
                self.stats.miss();
                crate::metrics::record_cache_lookup(self.name, false);
            }
        }
        found
    }

    pub fn put(&self, hash: Hash, value: T) {
        self.inner.lock().put(hash, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// Reward transaction batches of one distribution period.
pub type RewardBatches = Arc<Vec<Vec<Transaction>>>;

/// Vote reward batches per fork, keyed by the hash of the period's
/// calculation-end block.
///
/// Block hashes carry their height in the top bytes, so map order is height
/// order and the first entry is the oldest period.
#[derive(Default)]
pub struct VoteRewardCache {
    inner: RwLock<HashMap<Hash, BTreeMap<Hash, RewardBatches>>>,
}

impl VoteRewardCache {
    pub fn get(&self, fork: &Hash, calc_end: &Hash) -> Option<RewardBatches> {
        self.inner.read().get(fork)?.get(calc_end).cloned()
    }

    /// Stores `batches` and evicts the oldest other periods of `fork`.
    pub fn put(&self, fork: Hash, calc_end: Hash, batches: RewardBatches) {
        let mut inner = self.inner.write();
        let periods = inner.entry(fork).or_default();
        periods.insert(calc_end, batches);
        while periods.len() > MAX_CACHE_DISTRIBUTE_VOTE_REWARD_BLOCK_COUNT {
            let oldest = periods.keys().find(|k| **k != calc_end).copied();
            match oldest {
                Some(key) => {
                    periods.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn len(&self, fork: &Hash) -> usize {
        self.inner.read().get(fork).map_or(0, BTreeMap::len)
    }
}

/// The memoization caches of the block chain service.
pub struct ConsensusCaches {
    pub agreement: BlockCache<DelegateAgreement>,
    pub enrolled: BlockCache<DelegateEnrolled>,
    pub piggyback: BlockCache<ProofOfPiggyback>,
    pub vote_reward: VoteRewardCache,
}

impl ConsensusCaches {
    pub fn new() -> Self {
        Self {
            agreement: BlockCache::new("agreement", AGREEMENT_CACHE_CAPACITY),
            enrolled: BlockCache::new("enrolled", ENROLLED_CACHE_CAPACITY),
            piggyback: BlockCache::new("piggyback", PIGGYBACK_CACHE_CAPACITY),
            vote_reward: VoteRewardCache::default(),
        }
    }
}

impl Default for ConsensusCaches {
    fn default() -> Self {
        Self::new()
    }
}
