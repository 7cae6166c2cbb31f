//! XChaCha20-Poly1305 AEAD encryption, extended-nonce variant of RFC 8439.
//!
//! The spec fixes `Nonce` at 24 bytes (§3), so every AEAD operation in this
//! crate uses the X-variant rather than plain ChaCha20-Poly1305's 12-byte
//! nonce.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};

use crate::{CryptoError, Result};

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Key size for XChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Authentication tag size (128 bits = 16 bytes), matching
/// `tox_types::ENCRYPTION_OVERHEAD`.
pub const TAG_SIZE: usize = 16;

/// Encrypt data with XChaCha20-Poly1305.
///
/// * `key` - 32-byte encryption key
/// * `nonce` - 24-byte nonce (must never be reused with the same key)
/// * `aad` - additional authenticated data, not encrypted but authenticated
pub fn encrypt(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce);

    cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadDecryption)
}

/// Decrypt data with XChaCha20-Poly1305.
pub fn decrypt(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadDecryption)
}

/// Encrypt without additional authenticated data.
pub fn encrypt_no_aad(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    encrypt(key, nonce, plaintext, &[])
}

/// Decrypt without additional authenticated data.
pub fn decrypt_no_aad(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    decrypt(key, nonce, ciphertext, &[])
}
