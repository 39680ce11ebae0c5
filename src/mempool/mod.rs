//! Queue of locally-validated operations waiting to be mined.
//!
//! Order of arrival is preserved. The seen-id set outlives the queue
//! entries: once an operation id has passed through this node it is
//! never accepted from gossip again, which is what makes re-delivery a
//! no-op.

use std::collections::{HashSet, VecDeque};

use crate::geometry;
use crate::types::Operation;

/// Pending operations plus the gossip de-duplication set.
#[derive(Debug, Default)]
pub struct Mempool {
    queue: VecDeque<Operation>,
    seen: HashSet<String>,
}

impl Mempool {
    /// Create an empty mempool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this id has ever passed through the node.
    #[must_use]
    pub fn seen(&self, unique_id: &str) -> bool {
        self.seen.contains(unique_id)
    }

    /// Queue a fresh operation. Returns `false` (and drops it) when
    /// the id was already seen.
    pub fn push(&mut self, op: Operation) -> bool {
        if !self.seen.insert(op.unique_id.clone()) {
            return false;
        }

        self.queue.push_back(op);
        true
    }

    /// Put reorged operations back at the head of the queue, keeping
    /// their relative order. Bypasses the seen check: these ids were
    /// admitted once already.
    pub fn reinsert_front(&mut self, ops: Vec<Operation>) {
        for op in ops.into_iter().rev() {
            self.seen.insert(op.unique_id.clone());
            self.queue.push_front(op);
        }
    }

    /// Remove the operations mined into a winning block.
    pub fn remove_ids(&mut self, ids: &[String]) {
        self.queue.retain(|op| !ids.contains(&op.unique_id));
    }

    /// Drop every queued operation failing `keep`.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Operation) -> bool,
    {
        self.queue.retain(keep);
    }

    /// A maximal prefix of the queue whose operations do not intersect
    /// across owners, cloned for a block candidate.
    ///
    /// Greedy: walk the queue in order and take each operation whose
    /// shape crosses no already-taken shape of a different owner. The
    /// queue itself is untouched; winners are removed only when their
    /// block lands.
    #[must_use]
    pub fn compatible_prefix(&self) -> Vec<Operation> {
        let mut taken: Vec<&Operation> = Vec::new();

        for op in &self.queue {
            let fits = match op.shape() {
                None => true,
                Some(shape) => taken.iter().all(|prior| {
                    if prior.owner == op.owner {
                        return true;
                    }
                    prior.shape().map_or(true, |prior_shape| {
                        !geometry::shapes_intersect(&shape.segments, &prior_shape.segments)
                    })
                }),
            };

            if fits {
                taken.push(op);
            }
        }

        taken.into_iter().cloned().collect()
    }

    /// Queued operation count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterate the queue in order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.queue.iter()
    }
}
