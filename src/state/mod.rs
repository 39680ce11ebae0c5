//! Shared node state and the block/operation acceptance paths.
//!
//! Everything validation spans — block store, chain view, mempool,
//! peer set — lives in one [`NodeState`] behind one `RwLock`. The
//! mining loop never hashes under that lock; it watches the lock-free
//! [`Signals`] mirror (tip epoch, mempool length) and re-checks its
//! snapshot when committing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::chain::{history_on, ink_balance, BlockStore, ChainView};
use crate::crypto::{Keypair, PublicKey};
use crate::mempool::Mempool;
use crate::network::Peer;
use crate::types::{Block, MinerInfo, MinerNetSettings, Operation};
use crate::validate::{self, ValidationError};

/// Lock-free mirror of the facts the mining loop polls every nonce.
#[derive(Debug, Default)]
pub struct Signals {
    epoch: AtomicU64,
    mempool_len: AtomicUsize,
}

impl Signals {
    /// Current tip epoch; changes whenever the best tip moves.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Queued operation count at last state change.
    #[must_use]
    pub fn mempool_len(&self) -> usize {
        self.mempool_len.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    fn set_mempool_len(&self, len: usize) {
        self.mempool_len.store(len, Ordering::Release);
    }
}

/// What became of a delivered block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockDisposition {
    /// Hash already stored; re-delivery is a no-op
    AlreadyKnown,
    /// Validated and inserted
    Accepted,
}

/// The node's entire mutable state, guarded by one lock.
pub struct NodeState {
    /// Network settings fixed at registration
    pub settings: MinerNetSettings,
    /// Block DAG
    pub store: BlockStore,
    /// Cached best-tip choice
    pub view: ChainView,
    /// Pending operations + seen ids
    pub mempool: Mempool,
    /// Live peer connections, keyed by advertised address
    pub peers: HashMap<String, Peer>,
}

impl NodeState {
    /// Create state rooted at the settings' genesis hash.
    #[must_use]
    pub fn new(settings: MinerNetSettings) -> Self {
        let store = BlockStore::new(settings.genesis_block_hash.clone());

        Self {
            settings,
            store,
            view: ChainView::new(),
            mempool: Mempool::new(),
            peers: HashMap::new(),
        }
    }

    /// The current best tip.
    pub fn best_tip(&mut self) -> String {
        self.view.best_tip(&self.store)
    }

    /// `owner`'s ink balance along the current best chain.
    pub fn best_balance(&mut self, owner: &PublicKey) -> u32 {
        let tip = self.best_tip();
        let path = self.store.path_records(&tip).unwrap_or_default();

        ink_balance(path.iter().map(|r| &r.block), owner, &self.settings)
    }

    /// Validate and insert a block, then repair the mempool if the
    /// best tip moved.
    ///
    /// # Errors
    /// Returns the validation failure; the block is dropped.
    pub fn accept_block(
        &mut self,
        block: Block,
        signals: &Signals,
    ) -> Result<BlockDisposition, ValidationError> {
        if self.store.exists(&block.hash) {
            return Ok(BlockDisposition::AlreadyKnown);
        }

        validate::check_block(&block, &self.store, &self.settings)?;

        let old_tip = self.best_tip();
        self.store.insert(block, &self.settings).map_err(|e| match e {
            crate::chain::ChainError::UnknownParent(hash)
            | crate::chain::ChainError::UnknownBlock(hash) => ValidationError::UnknownParent(hash),
        })?;
        let new_tip = self.best_tip();

        if new_tip != old_tip {
            self.migrate_mempool(&old_tip, &new_tip);
            signals.bump_epoch();
        }

        signals.set_mempool_len(self.mempool.len());
        Ok(BlockDisposition::Accepted)
    }

    /// Validate an operation against the best chain and queue it.
    /// Returns `false` for an already-seen id.
    ///
    /// # Errors
    /// Returns the validation failure; the operation is dropped.
    pub fn accept_operation(
        &mut self,
        op: Operation,
        signals: &Signals,
    ) -> Result<bool, ValidationError> {
        if self.mempool.seen(&op.unique_id) {
            return Ok(false);
        }

        let tip = self.best_tip();
        let path = self.store.path_records(&tip).unwrap_or_default();
        validate::check_operation(&op, &path, &self.settings)?;

        self.mempool.push(op);
        signals.set_mempool_len(self.mempool.len());
        Ok(true)
    }

    // The best tip moved from `old_tip` to `new_tip`. Operations mined
    // on the new chain leave the mempool; operations stranded on the
    // abandoned branch come back if they still validate; queued
    // operations that the new chain invalidates are dropped.
    fn migrate_mempool(&mut self, old_tip: &str, new_tip: &str) {
        let Self {
            store,
            mempool,
            settings,
            ..
        } = self;

        let new_path = store.path_records(new_tip).unwrap_or_default();

        let new_ids: HashSet<&str> = new_path
            .iter()
            .flat_map(|r| &r.block.ops)
            .map(|op| op.unique_id.as_str())
            .collect();

        let stranded: Vec<Operation> = store
            .path_records(old_tip)
            .unwrap_or_default()
            .iter()
            .flat_map(|r| &r.block.ops)
            .filter(|op| !new_ids.contains(op.unique_id.as_str()))
            .cloned()
            .collect();

        mempool.retain(|op| {
            !new_ids.contains(op.unique_id.as_str())
                && validate::check_operation(op, &new_path, settings).is_ok()
        });

        let revived: Vec<Operation> = stranded
            .into_iter()
            .filter(|op| validate::check_operation(op, &new_path, settings).is_ok())
            .collect();

        if !revived.is_empty() {
            debug!(count = revived.len(), "reorg revived stranded operations");
        }
        mempool.reinsert_front(revived);

        info!(old_tip = %old_tip, new_tip = %new_tip, "best tip moved");
    }
}

/// Everything a task needs to participate in the node: the locked
/// state, the lock-free signals, the miner identity, and the fixed
/// settings.
#[derive(Clone)]
pub struct NodeHandle {
    /// The shared state lock
    pub state: Arc<RwLock<NodeState>>,
    /// Lock-free mining signals
    pub signals: Arc<Signals>,
    /// This miner's keypair
    pub keypair: Arc<Keypair>,
    /// Network settings, immutable for the run
    pub settings: Arc<MinerNetSettings>,
    /// How this miner advertises itself to peers
    pub local_info: MinerInfo,
}

impl NodeHandle {
    /// Build a fresh node.
    #[must_use]
    pub fn new(settings: MinerNetSettings, keypair: Keypair, address: String) -> Self {
        let local_info = MinerInfo {
            address,
            key: *keypair.public_key(),
        };

        Self {
            state: Arc::new(RwLock::new(NodeState::new(settings.clone()))),
            signals: Arc::new(Signals::default()),
            keypair: Arc::new(keypair),
            settings: Arc::new(settings),
            local_info,
        }
    }

    /// The block hash that contains `op_id` on the best chain, with
    /// its confirmation count, if any.
    pub async fn find_on_best_chain(&self, op_id: &str) -> Option<(String, u64)> {
        let mut state = self.state.write().await;
        let tip = state.best_tip();
        let path = state.store.path_records(&tip)?;

        let block_hash = history_on(&path)
            .iter()
            .find(|h| h.op.unique_id == op_id)
            .map(|h| h.block_hash.to_string())?;

        let confirmations = ChainView::confirmations(&state.store, &tip, &block_hash)?;
        Some((block_hash, confirmations))
    }
}
