//! Cryptographic primitives for the ink-mining protocol.
//!
//! - ECDSA over P-384 for operation and identity signatures
//! - MD5 for the block proof-of-work digest (wire-compatible with the
//!   rest of the network; the digest is a puzzle target, signatures are
//!   the security boundary)

mod hash;
mod signature;

pub use hash::{has_trailing_zeros, md5_hex};
pub use signature::{verify, Keypair, OpSignature, PublicKey, SecretKey};

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,
    /// Invalid public key format
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    /// Invalid private key format
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
