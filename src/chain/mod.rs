//! The in-memory chain: block storage and longest-chain views.

mod store;
mod view;

pub use store::{BlockRecord, BlockStore};
pub use view::{history_on, ink_balance, ChainView, HistoryOp};

use thiserror::Error;

/// Chain structure errors
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Block references a parent this store has never seen
    #[error("unknown parent block {0}")]
    UnknownParent(String),
    /// Hash resolves to no stored block
    #[error("unknown block {0}")]
    UnknownBlock(String),
}
