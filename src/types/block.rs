//! Blocks of the ink-mining chain.
//!
//! A block is the wire object only: parent hash, operations, miner key
//! and nonce, plus its own proof-of-work hash. Everything derived from
//! chain position (path length, ink bank, tip flag) lives in the block
//! store and is never transmitted.

use serde::{Deserialize, Serialize};

use crate::crypto::{has_trailing_zeros, md5_hex, PublicKey};
use crate::types::{MinerNetSettings, Operation};

/// One block in the chain DAG.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the parent block
    pub parent_hash: String,
    /// This block's proof-of-work hash
    pub hash: String,
    /// Operations embedded in this block; empty for a no-op block
    pub ops: Vec<Operation>,
    /// Who mined the block (and earns its reward)
    pub miner: PublicKey,
    /// The proof-of-work secret
    pub nonce: u32,
}

impl Block {
    /// Start a candidate block: hash unset, nonce zero.
    #[must_use]
    pub fn candidate(parent_hash: String, ops: Vec<Operation>, miner: PublicKey) -> Self {
        Self {
            parent_hash,
            hash: String::new(),
            ops,
            miner,
            nonce: 0,
        }
    }

    /// Whether the block carries no operations.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    /// The difficulty this block must meet.
    #[must_use]
    pub fn difficulty(&self, settings: &MinerNetSettings) -> u8 {
        if self.is_noop() {
            settings.pow_difficulty_noop_block
        } else {
            settings.pow_difficulty_op_block
        }
    }

    /// The mining reward this block pays its miner.
    #[must_use]
    pub fn reward(&self, settings: &MinerNetSettings) -> u32 {
        if self.is_noop() {
            settings.ink_per_noop_block
        } else {
            settings.ink_per_op_block
        }
    }

    /// Recompute the proof-of-work hash from the canonical preimage:
    /// `parent_hash ‖ concat(op_tag ‖ op_id) ‖ hex(miner key) ‖ nonce`.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut preimage = String::with_capacity(self.parent_hash.len() + 128);
        preimage.push_str(&self.parent_hash);

        for op in &self.ops {
            preimage.push_str(op.tag());
            preimage.push_str(&op.unique_id);
        }

        preimage.push_str(&self.miner.to_hex());
        preimage.push_str(&self.nonce.to_string());

        md5_hex(preimage.as_bytes())
    }

    /// Whether `hash` is the true preimage hash and meets difficulty.
    #[must_use]
    pub fn proof_of_work_valid(&self, settings: &MinerNetSettings) -> bool {
        self.hash == self.compute_hash() && has_trailing_zeros(&self.hash, self.difficulty(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::geometry::parse_segments;
    use crate::types::{CanvasSettings, OpAction, Shape, ShapeType};

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

    fn test_add_op(kp: &Keypair, svg: &str) -> Operation {
        let segments = parse_segments(svg).unwrap();
        let ink_cost = crate::geometry::ink_cost(&segments, "transparent");

        Operation::new_add(
            kp,
            1,
            Shape {
                shape_type: ShapeType::Path,
                svg: svg.to_string(),
                fill: "transparent".to_string(),
                stroke: "red".to_string(),
                segments,
                ink_cost,
            },
        )
    }

    /// Mine a valid block for tests; difficulty 1 falls out fast.
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

    #[test]
    fn test_hash_deterministic() {
        let kp = Keypair::generate();
        let block = Block::candidate("parent".to_string(), Vec::new(), *kp.public_key());

        assert_eq!(block.compute_hash(), block.compute_hash());
    }

    #[test]
    fn test_hash_covers_every_field() {
        let kp = Keypair::generate();
        let base = Block::candidate("parent".to_string(), Vec::new(), *kp.public_key());

        let mut nonce_changed = base.clone();
        nonce_changed.nonce = 1;
        assert_ne!(base.compute_hash(), nonce_changed.compute_hash());

        let mut parent_changed = base.clone();
        parent_changed.parent_hash = "other".to_string();
        assert_ne!(base.compute_hash(), parent_changed.compute_hash());

        let mut ops_changed = base.clone();
        ops_changed.ops.push(test_add_op(&kp, "M 0 0 L 5 0"));
        assert_ne!(base.compute_hash(), ops_changed.compute_hash());

        let other_miner = Keypair::generate();
        let mut miner_changed = base.clone();
        miner_changed.miner = *other_miner.public_key();
        assert_ne!(base.compute_hash(), miner_changed.compute_hash());
    }

    #[test]
    fn test_delete_and_add_tags_differ_in_preimage() {
        let kp = Keypair::generate();
        let add = test_add_op(&kp, "M 0 0 L 5 0");

        let mut delete = add.clone();
        delete.action = OpAction::Delete {
            target_id: "1".to_string(),
        };

        let with_add = Block::candidate("p".to_string(), vec![add], *kp.public_key());
        let with_delete = Block::candidate("p".to_string(), vec![delete], *kp.public_key());
        assert_ne!(with_add.compute_hash(), with_delete.compute_hash());
    }

    #[test]
    fn test_mined_block_passes_proof_of_work() {
        let settings = test_settings();
        let kp = Keypair::generate();

        let block = mine(
            Block::candidate("genesis".to_string(), Vec::new(), *kp.public_key()),
            &settings,
        );

        assert!(block.proof_of_work_valid(&settings));
    }

    #[test]
    fn test_tampered_hash_fails_proof_of_work() {
        let settings = test_settings();
        let kp = Keypair::generate();

        let mut block = mine(
            Block::candidate("genesis".to_string(), Vec::new(), *kp.public_key()),
            &settings,
        );
        block.nonce += 1;

        assert!(!block.proof_of_work_valid(&settings));
    }

    #[test]
    fn test_difficulty_and_reward_split_by_kind() {
        let settings = test_settings();
        let kp = Keypair::generate();

        let noop = Block::candidate("p".to_string(), Vec::new(), *kp.public_key());
        assert_eq!(noop.difficulty(&settings), settings.pow_difficulty_noop_block);
        assert_eq!(noop.reward(&settings), settings.ink_per_noop_block);

        let op = Block::candidate(
            "p".to_string(),
            vec![test_add_op(&kp, "M 0 0 L 5 0")],
            *kp.public_key(),
        );
        assert_eq!(op.difficulty(&settings), settings.pow_difficulty_op_block);
        assert_eq!(op.reward(&settings), settings.ink_per_op_block);
    }
}
