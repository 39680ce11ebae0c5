//! In-memory block DAG keyed by hash.
//!
//! The store holds every accepted block with its derived chain state
//! (path length, the miner's ink bank, tip flag) and maintains one
//! structural invariant: the set of tip-flagged blocks is exactly the
//! set of leaves of the forest rooted at genesis.

use std::collections::HashMap;

use crate::types::{Block, MinerNetSettings};

use super::{view, ChainError};

/// A stored block plus everything derived from its chain position.
#[derive(Clone, Debug)]
pub struct BlockRecord {
    /// The wire block
    pub block: Block,
    /// Blocks from genesis to here, inclusive; genesis counts 1
    pub path_length: u64,
    /// The miner's ink balance along this block's chain, reward included
    pub ink_bank: u32,
    /// Whether no stored block names this one as parent
    pub is_tip: bool,
}

/// Hash-keyed block storage with tip tracking.
///
/// Genesis is implicit: it has a hash and a tip flag but no record,
/// carries no operations, and pays no reward.
#[derive(Clone, Debug)]
pub struct BlockStore {
    genesis_hash: String,
    genesis_is_tip: bool,
    records: HashMap<String, BlockRecord>,
}

impl BlockStore {
    /// Create a store seeded with the network's genesis hash.
    #[must_use]
    pub fn new(genesis_hash: String) -> Self {
        Self {
            genesis_hash,
            genesis_is_tip: true,
            records: HashMap::new(),
        }
    }

    /// The genesis hash this store is rooted at.
    #[must_use]
    pub fn genesis_hash(&self) -> &str {
        &self.genesis_hash
    }

    /// Whether `hash` names genesis or a stored block.
    #[must_use]
    pub fn exists(&self, hash: &str) -> bool {
        hash == self.genesis_hash || self.records.contains_key(hash)
    }

    /// Look up a stored block record. Genesis has none.
    #[must_use]
    pub fn get(&self, hash: &str) -> Option<&BlockRecord> {
        self.records.get(hash)
    }

    /// Path length of `hash`: genesis is 1.
    #[must_use]
    pub fn path_length(&self, hash: &str) -> Option<u64> {
        if hash == self.genesis_hash {
            Some(1)
        } else {
            self.records.get(hash).map(|r| r.path_length)
        }
    }

    /// Hashes of the blocks whose parent is `hash`.
    ///
    /// # Errors
    /// Returns [`ChainError::UnknownBlock`] if `hash` is not stored.
    pub fn children(&self, hash: &str) -> Result<Vec<String>, ChainError> {
        if !self.exists(hash) {
            return Err(ChainError::UnknownBlock(hash.to_string()));
        }

        Ok(self
            .records
            .iter()
            .filter(|(_, r)| r.block.parent_hash == hash)
            .map(|(h, _)| h.clone())
            .collect())
    }

    /// Current tips as `(hash, path_length)` pairs.
    #[must_use]
    pub fn tips(&self) -> Vec<(String, u64)> {
        let mut tips: Vec<(String, u64)> = self
            .records
            .iter()
            .filter(|(_, r)| r.is_tip)
            .map(|(h, r)| (h.clone(), r.path_length))
            .collect();

        if self.genesis_is_tip {
            tips.push((self.genesis_hash.clone(), 1));
        }

        tips
    }

    /// Insert a block, deriving its path length and ink bank.
    ///
    /// Idempotent on a known hash. Returns `true` when the block was
    /// newly inserted.
    ///
    /// # Errors
    /// Returns [`ChainError::UnknownParent`] when the parent is not
    /// stored; the caller decides whether to park or drop.
    pub fn insert(&mut self, block: Block, settings: &MinerNetSettings) -> Result<bool, ChainError> {
        if self.exists(&block.hash) {
            return Ok(false);
        }

        let parent_length = self
            .path_length(&block.parent_hash)
            .ok_or_else(|| ChainError::UnknownParent(block.parent_hash.clone()))?;

        let ink_bank = {
            let parent_path = self.path_records(&block.parent_hash).unwrap_or_default();
            let mut chain: Vec<&Block> = parent_path.iter().map(|r| &r.block).collect();
            chain.push(&block);
            view::ink_balance(chain, &block.miner, settings)
        };

        if block.parent_hash == self.genesis_hash {
            self.genesis_is_tip = false;
        } else if let Some(parent) = self.records.get_mut(&block.parent_hash) {
            parent.is_tip = false;
        }

        let hash = block.hash.clone();
        self.records.insert(
            hash,
            BlockRecord {
                block,
                path_length: parent_length + 1,
                ink_bank,
                is_tip: true,
            },
        );

        Ok(true)
    }

    /// Records from genesis (exclusive) down to `tip`, genesis-first.
    ///
    /// `tip == genesis` yields the empty path.
    #[must_use]
    pub fn path_records(&self, tip: &str) -> Option<Vec<&BlockRecord>> {
        if tip == self.genesis_hash {
            return Some(Vec::new());
        }

        let mut path = Vec::new();
        let mut cursor = self.records.get(tip)?;

        loop {
            path.push(cursor);
            if cursor.block.parent_hash == self.genesis_hash {
                break;
            }
            cursor = self.records.get(&cursor.block.parent_hash)?;
        }

        path.reverse();
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{has_trailing_zeros, Keypair};
    use crate::types::CanvasSettings;

    fn test_settings() -> MinerNetSettings {
        MinerNetSettings {
            genesis_block_hash: "genesis".to_string(),
            min_peer_connections: 1,
            ink_per_op_block: 50,
            ink_per_noop_block: 25,
            heartbeat_ms: 1000,
            pow_difficulty_op_block: 1,
            pow_difficulty_noop_block: 1,
            canvas: CanvasSettings {
                x_max: 1024,
                y_max: 1024,
            },
        }
    }

    fn mine(mut block: Block, settings: &MinerNetSettings) -> Block {
        loop {
            let hash = block.compute_hash();
            if has_trailing_zeros(&hash, block.difficulty(settings)) {
                block.hash = hash;
                return block;
            }
            block.nonce += 1;
        }
    }

    fn mined_child(parent: &str, kp: &Keypair, settings: &MinerNetSettings) -> Block {
        mine(
            Block::candidate(parent.to_string(), Vec::new(), *kp.public_key()),
            settings,
        )
    }

    #[test]
    fn test_genesis_is_initial_tip() {
        let store = BlockStore::new("genesis".to_string());

        assert!(store.exists("genesis"));
        assert_eq!(store.tips(), vec![("genesis".to_string(), 1)]);
        assert_eq!(store.path_length("genesis"), Some(1));
    }

    #[test]
    fn test_insert_extends_path_and_moves_tip() {
        let settings = test_settings();
        let kp = Keypair::generate();
        let mut store = BlockStore::new("genesis".to_string());

        let b1 = mined_child("genesis", &kp, &settings);
        assert!(store.insert(b1.clone(), &settings).unwrap());
        assert_eq!(store.path_length(&b1.hash), Some(2));
        assert_eq!(store.tips(), vec![(b1.hash.clone(), 2)]);

        let b2 = mined_child(&b1.hash, &kp, &settings);
        store.insert(b2.clone(), &settings).unwrap();

        assert_eq!(store.path_length(&b2.hash), Some(3));
        assert_eq!(store.tips(), vec![(b2.hash.clone(), 3)]);
        assert!(!store.get(&b1.hash).unwrap().is_tip);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let settings = test_settings();
        let kp = Keypair::generate();
        let mut store = BlockStore::new("genesis".to_string());

        let b1 = mined_child("genesis", &kp, &settings);
        assert!(store.insert(b1.clone(), &settings).unwrap());
        assert!(!store.insert(b1, &settings).unwrap());
        assert_eq!(store.tips().len(), 1);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let settings = test_settings();
        let kp = Keypair::generate();
        let mut store = BlockStore::new("genesis".to_string());

        let orphan = mined_child("nowhere", &kp, &settings);
        assert!(matches!(
            store.insert(orphan, &settings),
            Err(ChainError::UnknownParent(_))
        ));
    }

    #[test]
    fn test_fork_keeps_both_tips() {
        let settings = test_settings();
        let kp_a = Keypair::generate();
        let kp_b = Keypair::generate();
        let mut store = BlockStore::new("genesis".to_string());

        let a = mined_child("genesis", &kp_a, &settings);
        let b = mined_child("genesis", &kp_b, &settings);
        store.insert(a.clone(), &settings).unwrap();
        store.insert(b.clone(), &settings).unwrap();

        let mut tips: Vec<String> = store.tips().into_iter().map(|(h, _)| h).collect();
        tips.sort();
        let mut expected = vec![a.hash, b.hash];
        expected.sort();
        assert_eq!(tips, expected);
    }

    #[test]
    fn test_children_listing() {
        let settings = test_settings();
        let kp = Keypair::generate();
        let mut store = BlockStore::new("genesis".to_string());

        let b1 = mined_child("genesis", &kp, &settings);
        store.insert(b1.clone(), &settings).unwrap();

        assert_eq!(store.children("genesis").unwrap(), vec![b1.hash.clone()]);
        assert!(store.children(&b1.hash).unwrap().is_empty());
        assert!(matches!(
            store.children("missing"),
            Err(ChainError::UnknownBlock(_))
        ));
    }

    #[test]
    fn test_path_records_order() {
        let settings = test_settings();
        let kp = Keypair::generate();
        let mut store = BlockStore::new("genesis".to_string());

        let b1 = mined_child("genesis", &kp, &settings);
        store.insert(b1.clone(), &settings).unwrap();
        let b2 = mined_child(&b1.hash, &kp, &settings);
        store.insert(b2.clone(), &settings).unwrap();

        let path = store.path_records(&b2.hash).unwrap();
        let hashes: Vec<&str> = path.iter().map(|r| r.block.hash.as_str()).collect();
        assert_eq!(hashes, vec![b1.hash.as_str(), b2.hash.as_str()]);

        assert!(store.path_records("genesis").unwrap().is_empty());
        assert!(store.path_records("missing").is_none());
    }

    #[test]
    fn test_ink_bank_accumulates_for_miner() {
        let settings = test_settings();
        let kp = Keypair::generate();
        let mut store = BlockStore::new("genesis".to_string());

        let b1 = mined_child("genesis", &kp, &settings);
        store.insert(b1.clone(), &settings).unwrap();
        let b2 = mined_child(&b1.hash, &kp, &settings);
        store.insert(b2.clone(), &settings).unwrap();

        assert_eq!(store.get(&b1.hash).unwrap().ink_bank, 25);
        assert_eq!(store.get(&b2.hash).unwrap().ink_bank, 50);
    }

    #[test]
    fn test_every_stored_block_resolves_parent_with_incremented_length() {
        let settings = test_settings();
        let kp = Keypair::generate();
        let mut store = BlockStore::new("genesis".to_string());

        let mut parent = "genesis".to_string();
        for _ in 0..4 {
            let block = mined_child(&parent, &kp, &settings);
            parent = block.hash.clone();
            store.insert(block, &settings).unwrap();
        }

        for (hash, record) in &store.records {
            let parent_length = store.path_length(&record.block.parent_hash).unwrap();
            assert_eq!(record.path_length, parent_length + 1, "block {hash}");
        }
    }
}
