//! Run-wide settings handed out by the directory at registration.

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

/// Canvas dimensions, immutable for the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSettings {
    /// Largest legal x coordinate
    pub x_max: u32,
    /// Largest legal y coordinate
    pub y_max: u32,
}

/// Settings for one ink-mining network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerNetSettings {
    /// Hash of the empty block every chain is rooted at
    pub genesis_block_hash: String,
    /// Below this peer count the miner asks the directory for more
    pub min_peer_connections: u8,
    /// Mining reward for a block carrying operations
    pub ink_per_op_block: u32,
    /// Mining reward for an empty block
    pub ink_per_noop_block: u32,
    /// Milliseconds between heartbeats expected by the directory
    pub heartbeat_ms: u32,
    /// Trailing zero count required of an op block hash
    pub pow_difficulty_op_block: u8,
    /// Trailing zero count required of a no-op block hash
    pub pow_difficulty_noop_block: u8,
    /// Canvas dimensions
    pub canvas: CanvasSettings,
}

/// A miner's advertised identity: where to dial it and who it is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInfo {
    /// TCP address the miner's peer endpoint listens on
    pub address: String,
    /// The miner's public key
    pub key: PublicKey,
}
