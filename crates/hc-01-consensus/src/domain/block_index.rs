//! # Block Index Graph
//!
//! In-memory DAG of block headers. Nodes live in an arena (`Vec`) and refer
//! to each other by arena index, so parent, next and origin links never
//! outlive the graph. A hash map resolves block hashes to indices.
//!
//! Each fork has a head. `next` links are only set along the branch that
//! currently ends at the fork head; switching the head rewires them.

use std::collections::{BTreeMap, HashMap};

use shared_types::{Amount, Block, BlockType, Destination, Hash, TxType, U256};

/// Header summary of a stored block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    pub hash: Hash,
    /// Zero for genesis.
    pub prev: Hash,
    /// Fork the block belongs to (hash of the fork's origin block).
    pub origin: Hash,
    /// Primary anchor of a fork block, zero for primary blocks.
    pub ref_block: Hash,
    pub block_type: BlockType,
    pub mint_type: TxType,
    pub dest_mint: Destination,
    pub timestamp: u32,
    pub number: u64,
    pub height: u32,
    /// Cumulative chain trust up to and including this block.
    pub chain_trust: U256,
    pub money_supply: Amount,
    pub money_destroy: Amount,
    /// Everything the mint transaction created (reward plus fees).
    pub mint_reward: Amount,
    /// Block reward portion of the mint, without fees.
    pub block_reward: Amount,
    pub state_root: Hash,
    pub agreement: Hash,
}

impl BlockIndex {
    /// Builds the index of `block` stored on `fork` on top of `prev`.
    pub fn from_block(
        block: &Block,
        fork: Hash,
        prev: Option<&BlockIndex>,
        block_trust: U256,
        block_reward: Amount,
    ) -> Self {
        let (ref_block, agreement) = match (block.piggyback_proof(), block.delegate_proof()) {
            (Some(p), _) => (p.ref_block, p.agreement),
            (None, Some(d)) => (Hash::zero(), d.agreement),
            _ => (Hash::zero(), Hash::zero()),
        };
        let prev_trust = prev.map(|p| p.chain_trust).unwrap_or_default();
        let prev_supply = prev.map(|p| p.money_supply).unwrap_or_default();
        let prev_destroy = prev.map(|p| p.money_destroy).unwrap_or_default();
        let (money_supply, block_reward) = if block.block_type.is_origin() {
            // The origin mint creates the fork's supply, it is not a reward.
            (block.mint_tx.amount, Amount::zero())
        } else {
            (prev_supply.saturating_add(block_reward), block_reward)
        };

        Self {
            hash: block.hash(),
            prev: block.prev,
            origin: fork,
            ref_block,
            block_type: block.block_type,
            mint_type: block.mint_tx.tx_type,
            dest_mint: block.mint_tx.to,
            timestamp: block.timestamp,
            number: block.number,
            height: block.height(),
            chain_trust: prev_trust.saturating_add(block_trust),
            money_supply,
            money_destroy: prev_destroy,
            mint_reward: block.mint_tx.amount,
            block_reward,
            state_root: block.state_root,
            agreement,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.block_type.is_primary()
    }

    pub fn is_origin(&self) -> bool {
        self.block_type.is_origin()
    }

    pub fn is_genesis(&self) -> bool {
        self.block_type.is_genesis()
    }

    pub fn is_subsidiary(&self) -> bool {
        self.block_type.is_subsidiary()
    }

    pub fn is_extended(&self) -> bool {
        self.block_type.is_extended()
    }

    pub fn is_vacant(&self) -> bool {
        self.block_type.is_vacant()
    }

    pub fn is_proof_of_work(&self) -> bool {
        self.mint_type == TxType::Work
    }
}

#[derive(Debug)]
struct Node {
    index: BlockIndex,
    prev: Option<u32>,
    next: Option<u32>,
}

/// Blocks that entered and left a fork's main branch on a head change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchChange {
    /// Oldest first.
    pub added: Vec<Hash>,
    /// Newest first.
    pub removed: Vec<Hash>,
}

/// Arena of block indices.
#[derive(Debug, Default)]
pub struct BlockIndexGraph {
    nodes: Vec<Node>,
    by_hash: HashMap<Hash, u32>,
    fork_heads: BTreeMap<Hash, u32>,
}

impl BlockIndexGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&BlockIndex> {
        self.by_hash.get(hash).map(|&i| &self.nodes[i as usize].index)
    }

    pub fn prev_of(&self, hash: &Hash) -> Option<&BlockIndex> {
        let node = &self.nodes[*self.by_hash.get(hash)? as usize];
        node.prev.map(|p| &self.nodes[p as usize].index)
    }

    pub fn next_of(&self, hash: &Hash) -> Option<&BlockIndex> {
        let node = &self.nodes[*self.by_hash.get(hash)? as usize];
        node.next.map(|n| &self.nodes[n as usize].index)
    }

    /// Adds a node. The previous block must already be present unless the
    /// node is genesis. Origin blocks also open their fork with themselves as
    /// head.
    pub fn insert(&mut self, index: BlockIndex) -> Result<(), String> {
        if self.by_hash.contains_key(&index.hash) {
            return Err(format!("duplicate index {:?}", index.hash));
        }
        let prev = if index.is_genesis() {
            None
        } else {
            Some(
                *self
                    .by_hash
                    .get(&index.prev)
                    .ok_or_else(|| format!("missing prev {:?}", index.prev))?,
            )
        };
        let slot = u32::try_from(self.nodes.len()).map_err(|_| "index arena full".to_string())?;
        let is_origin = index.is_origin();
        let hash = index.hash;
        self.nodes.push(Node {
            index,
            prev,
            next: None,
        });
        self.by_hash.insert(hash, slot);
        if is_origin {
            self.fork_heads.insert(hash, slot);
        }
        Ok(())
    }

    pub fn fork_head(&self, fork: &Hash) -> Option<&BlockIndex> {
        self.fork_heads
            .get(fork)
            .map(|&i| &self.nodes[i as usize].index)
    }

    /// Fork hashes with their heads, in hash order.
    pub fn forks(&self) -> impl Iterator<Item = (&Hash, &BlockIndex)> {
        self.fork_heads
            .iter()
            .map(|(fork, &i)| (fork, &self.nodes[i as usize].index))
    }

    /// Moves the head of `fork` to `new_head` and rewires `next` links.
    pub fn set_fork_head(&mut self, fork: &Hash, new_head: &Hash) -> Result<BranchChange, String> {
        let new_slot = *self
            .by_hash
            .get(new_head)
            .ok_or_else(|| format!("unknown head {:?}", new_head))?;
        let old_slot = *self
            .fork_heads
            .get(fork)
            .ok_or_else(|| format!("unknown fork {:?}", fork))?;

        let mut change = BranchChange::default();
        let mut a = Some(old_slot);
        let mut b = Some(new_slot);
        let mut added_slots = Vec::new();

        // Walk both branches back to their common ancestor. `number` grows
        // by one per block along a fork, so the longer side steps first.
        while a != b {
            let (na, nb) = match (a, b) {
                (Some(x), Some(y)) => (
                    self.nodes[x as usize].index.number,
                    self.nodes[y as usize].index.number,
                ),
                _ => return Err("branches do not share an ancestor".to_string()),
            };
            if na >= nb {
                if let Some(x) = a {
                    change.removed.push(self.nodes[x as usize].index.hash);
                    self.nodes[x as usize].next = None;
                    a = self.nodes[x as usize].prev;
                }
            }
            if nb > na || (na == nb && a != b) {
                if let Some(y) = b {
                    added_slots.push(y);
                    b = self.nodes[y as usize].prev;
                }
            }
        }

        if let Some(ancestor) = a {
            self.nodes[ancestor as usize].next = added_slots.last().copied();
        }
        for pair in added_slots.windows(2) {
            self.nodes[pair[1] as usize].next = Some(pair[0]);
        }
        self.nodes[new_slot as usize].next = None;
        added_slots.reverse();
        change.added = added_slots
            .iter()
            .map(|&s| self.nodes[s as usize].index.hash)
            .collect();

        self.fork_heads.insert(*fork, new_slot);
        Ok(change)
    }

    /// Whether `hash` lies on the branch ending at its fork's head.
    pub fn is_on_main_branch(&self, hash: &Hash) -> bool {
        let Some(index) = self.get(hash) else {
            return false;
        };
        let Some(head) = self.fork_head(&index.origin) else {
            return false;
        };
        self.walk_back(&head.hash)
            .find(|i| i.number <= index.number || i.is_origin())
            .map(|i| i.hash == *hash)
            .unwrap_or(false)
    }

    /// Iterator from `hash` back through its ancestors, `hash` included.
    pub fn walk_back<'a>(&'a self, hash: &Hash) -> impl Iterator<Item = &'a BlockIndex> + 'a {
        let mut cursor = self.by_hash.get(hash).copied();
        std::iter::from_fn(move || {
            let slot = cursor?;
            let node = &self.nodes[slot as usize];
            cursor = node.prev;
            Some(&node.index)
        })
    }

    /// Latest ancestor of `hash` (inclusive) whose height is `<= height`.
    pub fn ancestor(&self, hash: &Hash, height: u32) -> Option<&BlockIndex> {
        self.walk_back(hash).find(|i| i.height <= height)
    }

    /// Whether `ancestor` is `descendant` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: &Hash, descendant: &Hash) -> bool {
        let Some(target) = self.get(ancestor) else {
            return false;
        };
        self.walk_back(descendant)
            .take_while(|i| i.number >= target.number || i.origin != target.origin)
            .any(|i| i.hash == *ancestor)
    }

    /// Whether `hash` reaches `head` through vacant blocks only (or is it).
    pub fn is_equivalent(&self, hash: &Hash, head: &Hash) -> bool {
        let Some(target) = self.get(head) else {
            return false;
        };
        for index in self.walk_back(hash) {
            if index.hash == *head {
                return true;
            }
            if !index.is_vacant() || index.height <= target.height {
                break;
            }
        }
        false
    }

    /// Block locator for `fork`: dense near the head, doubling steps after.
    pub fn locator(&self, fork: &Hash, max: usize) -> Vec<Hash> {
        let Some(head) = self.fork_head(fork) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut step = 1usize;
        let mut skip = 0usize;
        let mut last_origin = None;
        for index in self.walk_back(&head.hash) {
            if index.origin != *fork {
                break;
            }
            last_origin = Some(index.hash);
            if skip == 0 {
                out.push(index.hash);
                if out.len() >= max {
                    return out;
                }
                if out.len() > 10 {
                    step *= 2;
                }
                skip = step;
            }
            skip -= 1;
        }
        if let Some(origin) = last_origin {
            if out.last() != Some(&origin) {
                out.push(origin);
            }
        }
        out
    }

    /// Main-branch hashes of `fork` following the first locator entry found
    /// on it, at most `max` of them.
    pub fn inv(&self, fork: &Hash, locator: &[Hash], max: usize) -> Vec<Hash> {
        let start = locator.iter().find(|h| {
            self.get(h).map(|i| i.origin == *fork).unwrap_or(false) && self.is_on_main_branch(h)
        });
        let Some(start) = start else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = self.next_of(start);
        while let Some(index) = cursor {
            if out.len() >= max {
                break;
            }
            out.push(index.hash);
            cursor = self.next_of(&index.hash);
        }
        out
    }
}
