//! Longest-chain selection and history reconstruction.

use rand::seq::SliceRandom;

use crate::crypto::PublicKey;
use crate::types::{Block, MinerNetSettings, OpAction, Operation};

use super::{BlockRecord, BlockStore};

/// Picks the best tip and keeps the choice stable across calls.
///
/// Ties between equal-length tips break uniformly at random, but the
/// chosen tip is cached until it stops being a tip or a strictly
/// longer tip appears, so one mining pass never sees the choice
/// thrash.
#[derive(Clone, Debug, Default)]
pub struct ChainView {
    cached_tip: Option<String>,
}

impl ChainView {
    /// Create a view with no cached choice.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tip of the current best chain.
    pub fn best_tip(&mut self, store: &BlockStore) -> String {
        let tips = store.tips();
        let best_length = tips.iter().map(|(_, len)| *len).max().unwrap_or(1);

        if let Some(cached) = &self.cached_tip {
            if tips
                .iter()
                .any(|(hash, len)| hash == cached && *len == best_length)
            {
                return cached.clone();
            }
        }

        let candidates: Vec<&String> = tips
            .iter()
            .filter(|(_, len)| *len == best_length)
            .map(|(hash, _)| hash)
            .collect();

        let chosen = candidates
            .choose(&mut rand::thread_rng())
            .map_or_else(|| store.genesis_hash().to_string(), |hash| (*hash).clone());

        self.cached_tip = Some(chosen.clone());
        chosen
    }

    /// Confirmations of `block_hash` below `tip`: the number of blocks
    /// above it on that path. `None` when the block is not on the path.
    #[must_use]
    pub fn confirmations(store: &BlockStore, tip: &str, block_hash: &str) -> Option<u64> {
        let path = store.path_records(tip)?;

        path.iter()
            .position(|r| r.block.hash == block_hash)
            .map(|pos| (path.len() - pos - 1) as u64)
    }
}

/// One operation as seen along a chain path.
#[derive(Clone, Copy, Debug)]
pub struct HistoryOp<'a> {
    /// The operation
    pub op: &'a Operation,
    /// Hash of the block embedding it
    pub block_hash: &'a str,
    /// For Adds: whether a later Delete on the same path consumed it
    pub deleted: bool,
}

/// All operations along `path` in block order, with Adds annotated by
/// whether a later Delete cancels them.
#[must_use]
pub fn history_on<'a>(path: &[&'a BlockRecord]) -> Vec<HistoryOp<'a>> {
    let deleted_ids: Vec<&str> = path
        .iter()
        .flat_map(|r| &r.block.ops)
        .filter_map(|op| match &op.action {
            OpAction::Delete { target_id } => Some(target_id.as_str()),
            OpAction::Add(_) => None,
        })
        .collect();

    path.iter()
        .flat_map(|r| r.block.ops.iter().map(move |op| (r.block.hash.as_str(), op)))
        .map(|(block_hash, op)| HistoryOp {
            op,
            block_hash,
            deleted: op.is_add() && deleted_ids.contains(&op.unique_id.as_str()),
        })
        .collect()
}

/// `owner`'s ink balance along `blocks`, genesis-first: block rewards
/// earned, minus the cost of their accepted Adds, plus refunds for
/// their Adds a later Delete cancelled. A Delete itself costs nothing.
#[must_use]
pub fn ink_balance<'a, I>(blocks: I, owner: &PublicKey, settings: &MinerNetSettings) -> u32
where
    I: IntoIterator<Item = &'a Block>,
{
    let mut balance: i64 = 0;
    let mut add_costs: Vec<(&str, u32)> = Vec::new();

    for block in blocks {
        if block.miner == *owner {
            balance += i64::from(block.reward(settings));
        }

        for op in &block.ops {
            if op.owner != *owner {
                continue;
            }

            match &op.action {
                OpAction::Add(shape) => {
                    balance -= i64::from(shape.ink_cost);
                    add_costs.push((op.unique_id.as_str(), shape.ink_cost));
                }
                OpAction::Delete { target_id } => {
                    if let Some((_, cost)) = add_costs
                        .iter()
                        .find(|(id, _)| id == &target_id.as_str())
                    {
                        balance += i64::from(*cost);
                    }
                }
            }
        }
    }

    balance.max(0) as u32
}
