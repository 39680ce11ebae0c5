//! The proof-of-work mining loop.
//!
//! One dedicated task per node. Each pass snapshots the best tip and a
//! compatible mempool prefix under the state lock, then hashes
//! lock-free. Every nonce it re-reads the lock-free signals: a tip
//! change aborts the pass, and a no-op candidate abandons the search
//! as soon as real work arrives. The found block is committed under
//! the lock only if the snapshot is still current, then flooded.

use tracing::{debug, info, warn};

use crate::crypto::has_trailing_zeros;
use crate::network;
use crate::state::{BlockDisposition, NodeHandle};
use crate::types::Block;

/// Nonces hashed between cooperative yields to the runtime.
const YIELD_INTERVAL: u32 = 1024;

/// Run the mining loop forever.
pub async fn run(node: NodeHandle) {
    info!(miner = %node.local_info.key, "mining loop started");

    loop {
        let (candidate, snapshot_epoch) = {
            let mut state = node.state.write().await;
            let tip = state.best_tip();
            let ops = state.mempool.compatible_prefix();

            (
                Block::candidate(tip, ops, node.local_info.key),
                node.signals.epoch(),
            )
        };

        let Some(block) = search(&node, candidate, snapshot_epoch).await else {
            // Preempted; take a fresh snapshot.
            tokio::task::yield_now().await;
            continue;
        };

        let committed = {
            let mut state = node.state.write().await;

            // The tip may have moved between the last nonce and here.
            if node.signals.epoch() != snapshot_epoch {
                debug!(hash = %block.hash, "tip moved during commit, abandoning block");
                false
            } else {
                match state.accept_block(block.clone(), &node.signals) {
                    Ok(BlockDisposition::Accepted) => true,
                    Ok(BlockDisposition::AlreadyKnown) => false,
                    Err(e) => {
                        warn!(error = %e, "own candidate failed validation");
                        false
                    }
                }
            }
        };

        if committed {
            info!(
                hash = %block.hash,
                ops = block.ops.len(),
                nonce = block.nonce,
                "mined block"
            );
            network::flood_block(&node, &block, None).await;
        }
    }
}

// Grind nonces until the difficulty target is met or the snapshot goes
// stale. Returns None on preemption.
async fn search(node: &NodeHandle, mut block: Block, snapshot_epoch: u64) -> Option<Block> {
    let difficulty = block.difficulty(&node.settings);
    let noop = block.is_noop();

    loop {
        if node.signals.epoch() != snapshot_epoch {
            return None;
        }
        if noop && node.signals.mempool_len() > 0 {
            return None;
        }

        let hash = block.compute_hash();
        if has_trailing_zeros(&hash, difficulty) {
            block.hash = hash;
            return Some(block);
        }

        block.nonce = block.nonce.wrapping_add(1);
        if block.nonce % YIELD_INTERVAL == 0 {
            tokio::task::yield_now().await;
        }
    }
}
