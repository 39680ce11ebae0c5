//! # BlockArt Ink Miner
//!
//! A peer-to-peer miner for a collaborative vector-art blockchain.
//!
//! ## Architecture
//!
//! Each node plays three roles at once:
//! - **Miner**: grinds proof-of-work blocks over the pending
//!   operations, earning the ink that pays for drawing
//! - **Gossip peer**: floods blocks and operations to the miners the
//!   directory introduces, converging on the longest chain
//! - **Art gateway**: authenticates a local art-app by key challenge
//!   and turns its add/delete calls into confirmed chain operations
//!
//! ## Consistency model
//!
//! No coordination beyond proof-of-work and longest-chain selection:
//! forks are kept as a block tree, the best tip is the longest path
//! (ties broken randomly but held stable), and a tip flip migrates
//! stranded operations back into the mempool.

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod chain;
pub mod client;
pub mod crypto;
pub mod gateway;
pub mod geometry;
pub mod mempool;
pub mod miner;
pub mod network;
pub mod state;
pub mod types;
pub mod validate;

pub use chain::{BlockStore, ChainView};
pub use client::Canvas;
pub use crypto::{Keypair, PublicKey, SecretKey};
pub use gateway::ArtError;
pub use mempool::Mempool;
pub use state::{NodeHandle, NodeState};
pub use types::{Block, CanvasSettings, MinerNetSettings, Operation};
pub use validate::ValidationError;

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The fixed phrase every operation and identity signature covers.
///
/// Signing is randomized, so repeated signatures over this one phrase
/// still yield distinct `(r, s)` pairs — which is what makes them
/// usable as operation ids.
pub const KEY_CHALLENGE: &[u8] = b"This is the private key!";

/// Longest accepted SVG path literal, in bytes.
pub const MAX_SVG_STRING_LEN: usize = 128;
