//! Block digest and proof-of-work predicate.
//!
//! Block hashes are lowercase-hex MD5 digests of the canonical block
//! preimage (see [`crate::types::Block::compute_hash`]). A block meets
//! the proof-of-work target when its hash ends in the configured number
//! of `'0'` hex characters.

use md5::{Digest, Md5};

/// MD5 digest of `data`, rendered as a lowercase hex string.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Whether `hash` ends in at least `difficulty` `'0'` characters.
///
/// A difficulty of zero is trivially satisfied.
#[must_use]
pub fn has_trailing_zeros(hash: &str, difficulty: u8) -> bool {
    hash.bytes()
        .rev()
        .take(usize::from(difficulty))
        .filter(|b| *b == b'0')
        .count()
        == usize::from(difficulty)
}
