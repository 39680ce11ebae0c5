//! Operation and block validation against a reference chain path.
//!
//! Every ingress point — art-app submissions, gossip deliveries, the
//! miner's own candidates — funnels through these checks. An operation
//! is judged against the operation history of one chain path; a block
//! is judged against its parent's path plus its own contents.

use thiserror::Error;

use crate::chain::{history_on, ink_balance, BlockRecord, BlockStore};
use crate::geometry::{self, ShapeError};
use crate::types::{Block, MinerNetSettings, OpAction, Operation};

/// Why an operation or block was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Signature does not verify under the owner key
    #[error("bad operation signature")]
    BadSignature,
    /// An operation with this unique id is already on the path
    #[error("duplicate operation {0}")]
    Duplicate(String),
    /// Delete names an Add that does not exist, is already consumed,
    /// or belongs to someone else
    #[error("delete target {0} missing")]
    TargetMissing(String),
    /// The shape failed geometry validation
    #[error("invalid shape: {0}")]
    InvalidShape(#[from] ShapeError),
    /// The owner cannot pay for the Add
    #[error("insufficient ink: {remaining} remaining")]
    InsufficientInk {
        /// Balance the owner is left with
        remaining: u32,
    },
    /// The shape crosses a live shape of another owner
    #[error("shape overlaps {0}")]
    Overlap(String),
    /// Hash does not recompute or misses the difficulty target
    #[error("bad proof of work")]
    BadPow,
    /// Block parent is not in the store
    #[error("unknown parent block {0}")]
    UnknownParent(String),
}

/// Validate one operation against the history along `path`.
///
/// Checks run in order: signature, uniqueness, delete target, shape
/// geometry, ink balance, intersection.
///
/// # Errors
/// Returns the first failed check.
pub fn check_operation(
    op: &Operation,
    path: &[&BlockRecord],
    settings: &MinerNetSettings,
) -> Result<(), ValidationError> {
    op.verify_signature()
        .map_err(|_| ValidationError::BadSignature)?;

    let history = history_on(path);

    if history.iter().any(|h| h.op.unique_id == op.unique_id) {
        return Err(ValidationError::Duplicate(op.unique_id.clone()));
    }

    match &op.action {
        OpAction::Delete { target_id } => {
            let live_target = history.iter().any(|h| {
                h.op.is_add() && !h.deleted && h.op.unique_id == *target_id && h.op.owner == op.owner
            });

            if !live_target {
                return Err(ValidationError::TargetMissing(target_id.clone()));
            }
        }
        OpAction::Add(shape) => {
            // Re-derive geometry from the raw string rather than trust
            // the submitter's segments and cost.
            let parsed =
                geometry::parse_shape(&shape.svg, &shape.fill, &shape.stroke, &settings.canvas)?;

            if parsed.segments != shape.segments || parsed.ink_cost != shape.ink_cost {
                return Err(ValidationError::InvalidShape(ShapeError::MalformedPath));
            }

            let balance = ink_balance(
                path.iter().map(|r| &r.block),
                &op.owner,
                settings,
            );
            if shape.ink_cost > balance {
                return Err(ValidationError::InsufficientInk { remaining: balance });
            }

            for h in &history {
                let foreign_live_add = h.op.is_add() && !h.deleted && h.op.owner != op.owner;
                if !foreign_live_add {
                    continue;
                }

                if let Some(other) = h.op.shape() {
                    if geometry::shapes_intersect(&shape.segments, &other.segments) {
                        return Err(ValidationError::Overlap(h.op.unique_id.clone()));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Validate a peer- or self-mined block before insertion.
///
/// # Errors
/// Returns the first failure: unknown parent, bad proof of work, any
/// embedded operation failing [`check_operation`] against the parent
/// path, a duplicate id inside the block, or two operations of
/// different owners intersecting inside the block.
pub fn check_block(
    block: &Block,
    store: &BlockStore,
    settings: &MinerNetSettings,
) -> Result<(), ValidationError> {
    if !store.exists(&block.parent_hash) {
        return Err(ValidationError::UnknownParent(block.parent_hash.clone()));
    }

    if !block.proof_of_work_valid(settings) {
        return Err(ValidationError::BadPow);
    }

    let path = store
        .path_records(&block.parent_hash)
        .ok_or_else(|| ValidationError::UnknownParent(block.parent_hash.clone()))?;

    for op in &block.ops {
        check_operation(op, &path, settings)?;
    }

    for (i, op) in block.ops.iter().enumerate() {
        if block.ops[..i].iter().any(|o| o.unique_id == op.unique_id) {
            return Err(ValidationError::Duplicate(op.unique_id.clone()));
        }

        let Some(shape) = op.shape() else { continue };

        for other in &block.ops[..i] {
            if other.owner == op.owner {
                continue;
            }

            if let Some(other_shape) = other.shape() {
                if geometry::shapes_intersect(&shape.segments, &other_shape.segments) {
                    return Err(ValidationError::Overlap(other.unique_id.clone()));
                }
            }
        }
    }

    Ok(())
}
