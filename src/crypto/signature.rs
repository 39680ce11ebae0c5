//! ECDSA identities over curve P-384.
//!
//! Operation signatures are *randomized*: every signing of the fixed
//! challenge phrase yields a fresh `(r, s)` pair, and the decimal
//! concatenation of that pair is the operation's unique id. Key
//! equality across transport encodings is decided by verifying a fresh
//! signature, never by structural comparison of key material.

use p384::ecdsa::{
    signature::{RandomizedSigner, Verifier as _},
    Signature as EcdsaSignature, SigningKey, VerifyingKey,
};
use num_bigint::BigUint;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::{CryptoError, CryptoResult};

/// SEC1 compressed P-384 point length in bytes.
const PUBLIC_KEY_LEN: usize = 49;

/// Raw `(r, s)` signature length in bytes (two 48-byte scalars).
const SIGNATURE_LEN: usize = 96;

/// A P-384 public key, held as its SEC1 compressed point.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Create from SEC1 compressed point bytes.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid curve point.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> CryptoResult<Self> {
        VerifyingKey::from_sec1_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Get the SEC1 compressed point bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Render as a hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string.
    ///
    /// # Errors
    /// Returns an error if the hex is malformed or not a curve point.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidPublicKey(format!(
                "expected {PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut arr = [0u8; PUBLIC_KEY_LEN];
        arr.copy_from_slice(&bytes);
        Self::from_bytes(arr)
    }

    fn to_verifying_key(self) -> CryptoResult<VerifyingKey> {
        VerifyingKey::from_sec1_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({}..)", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A raw `(r ‖ s)` ECDSA signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OpSignature([u8; SIGNATURE_LEN]);

impl OpSignature {
    /// Create from raw `r ‖ s` bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Render as a hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The decimal concatenation of `(r, s)`.
    ///
    /// This string identifies the operation carrying the signature; two
    /// randomized signings of the same message produce distinct ids.
    #[must_use]
    pub fn unique_id(&self) -> String {
        let r = BigUint::from_bytes_be(&self.0[..SIGNATURE_LEN / 2]);
        let s = BigUint::from_bytes_be(&self.0[SIGNATURE_LEN / 2..]);
        format!("{r}{s}")
    }
}

impl Serialize for OpSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for OpSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != SIGNATURE_LEN {
            return Err(serde::de::Error::custom("signature must be 96 bytes"));
        }
        let mut arr = [0u8; SIGNATURE_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for OpSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sig({}..)", &self.to_hex()[..16])
    }
}

/// A P-384 secret key.
///
/// Intentionally neither `Clone` nor `Debug` to keep key material from
/// leaking through logs or copies.
pub struct SecretKey(SigningKey);

impl SecretKey {
    /// Generate a new random secret key.
    #[must_use]
    pub fn generate() -> Self {
        Self(SigningKey::random(&mut OsRng))
    }

    /// Create from the raw 48-byte scalar.
    ///
    /// # Errors
    /// Returns an error if the scalar is out of range.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        SigningKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    /// Parse from a hex-encoded scalar.
    ///
    /// # Errors
    /// Returns an error if the hex is malformed or out of range.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw 48-byte scalar.
    ///
    /// # Security
    /// The returned bytes are live key material.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 48] {
        let mut arr = [0u8; 48];
        arr.copy_from_slice(&self.0.to_bytes());
        arr
    }

    /// Derive the public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let point = self.0.verifying_key().to_encoded_point(true);
        let mut arr = [0u8; PUBLIC_KEY_LEN];
        arr.copy_from_slice(point.as_bytes());
        PublicKey(arr)
    }

    /// Sign a message with a randomized nonce.
    ///
    /// Repeated calls over the same message yield distinct signatures.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> OpSignature {
        let sig: EcdsaSignature = self.0.sign_with_rng(&mut OsRng, message);
        let mut arr = [0u8; SIGNATURE_LEN];
        arr.copy_from_slice(&sig.to_bytes());
        OpSignature(arr)
    }
}

/// A keypair holding both halves of an identity.
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::generate())
    }

    /// Create from an existing secret key.
    #[must_use]
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Get the public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Sign a message with a randomized nonce.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> OpSignature {
        self.secret.sign(message)
    }

    /// Get the secret half.
    #[must_use]
    pub const fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Whether `candidate` is this keypair's public key.
    ///
    /// Decided by verifying a fresh signature over the fixed challenge
    /// phrase, so it holds regardless of how `candidate` was encoded in
    /// transit.
    #[must_use]
    pub fn matches(&self, candidate: &PublicKey) -> bool {
        let sig = self.sign(crate::KEY_CHALLENGE);
        verify(candidate, crate::KEY_CHALLENGE, &sig).is_ok()
    }
}

/// Verify a signature against a public key and message.
///
/// # Errors
/// Returns an error if the signature does not verify.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &OpSignature) -> CryptoResult<()> {
    let verifying_key = public_key.to_verifying_key()?;
    let sig = EcdsaSignature::from_slice(signature.as_bytes())
        .map_err(|_| CryptoError::InvalidSignature)?;

    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"test message";

        let sig = keypair.sign(message);
        assert!(verify(keypair.public_key(), message, &sig).is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = Keypair::generate();
        let sig = keypair.sign(b"original");

        assert!(verify(keypair.public_key(), b"tampered", &sig).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair1 = Keypair::generate();
        let keypair2 = Keypair::generate();
        let message = b"test";

        let sig = keypair1.sign(message);
        assert!(verify(keypair2.public_key(), message, &sig).is_err());
    }

    #[test]
    fn test_randomized_signatures_distinct() {
        let keypair = Keypair::generate();

        let sig1 = keypair.sign(crate::KEY_CHALLENGE);
        let sig2 = keypair.sign(crate::KEY_CHALLENGE);
        assert_ne!(sig1.as_bytes(), sig2.as_bytes());
        assert_ne!(sig1.unique_id(), sig2.unique_id());
    }

    #[test]
    fn test_unique_id_is_decimal() {
        let keypair = Keypair::generate();
        let id = keypair.sign(b"anything").unique_id();

        assert!(!id.is_empty());
        assert!(id.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_pubkey_hex_roundtrip() {
        let keypair = Keypair::generate();
        let hex_str = keypair.public_key().to_hex();
        let parsed = PublicKey::from_hex(&hex_str).unwrap();
        assert_eq!(keypair.public_key(), &parsed);
    }

    #[test]
    fn test_secret_key_hex_roundtrip_preserves_identity() {
        let secret = SecretKey::generate();

        let restored = SecretKey::from_hex(&hex::encode(secret.to_bytes())).unwrap();
        assert_eq!(secret.public_key(), restored.public_key());
    }

    #[test]
    fn test_keypair_matches() {
        let keypair = Keypair::generate();
        let other = Keypair::generate();

        assert!(keypair.matches(keypair.public_key()));
        assert!(!keypair.matches(other.public_key()));
    }
}
