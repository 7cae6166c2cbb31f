//! Cryptographic primitives backing the Tox-like core.
//!
//! The contracts these primitives satisfy are fixed by the spec as black
//! boxes (a NaCl `crypto_box`-equivalent authenticated public-key cipher,
//! and a Noise-IK-equivalent one-shot handshake); this crate fixes one
//! concrete instantiation of both, built from the same primitive set
//! (X25519, BLAKE3, XChaCha20-Poly1305, Ed25519) used throughout.
//!
//! ## Modules
//!
//! - [`blake3`] — domain-separated BLAKE3 hashing/derivation
//! - [`x25519`] — X25519 key agreement (RFC 7748)
//! - [`ed25519`] — Ed25519 signing/verification, used to authenticate
//!   group role-changes and announcements
//! - [`chacha20`] — XChaCha20-Poly1305 AEAD with a 24-byte nonce
//! - [`crypto_box`] — the crypto_box-equivalent: static X25519 DH + AEAD
//! - [`handshake`] — the Noise-IK-equivalent one-shot handshake
//! - [`pseudonym`] — per-epoch pseudonym derivation for async messaging

pub mod blake3;
pub mod chacha20;
pub mod crypto_box;
pub mod ed25519;
pub mod handshake;
pub mod pseudonym;
pub mod x25519;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("signature verification failed")]
    SignatureVerification,

    #[error("AEAD decryption failed")]
    AeadDecryption,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
