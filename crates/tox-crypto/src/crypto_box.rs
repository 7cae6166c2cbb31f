//! The NaCl `crypto_box`-equivalent authenticated public-key cipher the
//! spec treats as a black box (§1, §6): a static X25519 Diffie-Hellman
//! shared secret, domain-separated through BLAKE3, feeding
//! XChaCha20-Poly1305 with the caller-supplied nonce.
//!
//! Unlike [`crate::handshake`] (and unlike the reference crate's `ecies`
//! module), the sender's key is *static*, not ephemeral — the Tox friend
//! request and friend message protocols already carry a fresh nonce per
//! message (§3 "Nonce"), so there is no need to also rotate the sender's
//! public key.

use crate::blake3::{self, contexts};
use crate::chacha20;
use crate::x25519::{X25519PublicKey, X25519StaticSecret};
use crate::Result;

/// Encrypt `plaintext` to `recipient_pk` using our static secret `self_sk`
/// and the given `nonce`. The nonce must never be reused for the same
/// (self_sk, recipient_pk) pair.
pub fn encrypt(
    plaintext: &[u8],
    nonce: &[u8; chacha20::NONCE_SIZE],
    recipient_pk: &X25519PublicKey,
    self_sk: &X25519StaticSecret,
) -> Result<Vec<u8>> {
    let key = derive_shared_key(self_sk, recipient_pk);
    chacha20::encrypt_no_aad(&key, nonce, plaintext)
}

/// Decrypt a `crypto_box` ciphertext sent by `sender_pk` to us, using our
/// static secret `self_sk`.
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &[u8; chacha20::NONCE_SIZE],
    sender_pk: &X25519PublicKey,
    self_sk: &X25519StaticSecret,
) -> Result<Vec<u8>> {
    let key = derive_shared_key(self_sk, sender_pk);
    chacha20::decrypt_no_aad(&key, nonce, ciphertext)
}

fn derive_shared_key(self_sk: &X25519StaticSecret, their_pk: &X25519PublicKey) -> [u8; 32] {
    let shared = self_sk.diffie_hellman(their_pk);
    blake3::derive_key(contexts::BOX_ENCRYPTION_KEY, shared.as_bytes())
}
