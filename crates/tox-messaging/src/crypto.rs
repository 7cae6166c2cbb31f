//! Encryption contract for friend messages (§4.2): pad, seal with the
//! `crypto_box`-equivalent cipher, base64-encode — "Base64 is mandatory
//! because downstream packet framing treats the message field as a
//! printable-safe byte string" (§4.2).

use rand::RngCore;
use tox_crypto::crypto_box;
use tox_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use tox_types::MESSAGE_PADDING_TIERS;

use crate::padding;
use crate::{MessagingError, Result};

/// Pad, encrypt, and base64-encode `plaintext` for `peer_pk` using our
/// static secret `self_sk`. Returns the wire-ready text.
pub fn encrypt_message(plaintext: &[u8], peer_pk: [u8; 32], self_sk: [u8; 32]) -> Result<String> {
    let padded = padding::pad(plaintext, &MESSAGE_PADDING_TIERS)?;

    let mut nonce = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let peer_pk = X25519PublicKey::from_bytes(peer_pk);
    let self_sk = X25519StaticSecret::from_bytes(self_sk);
    let ciphertext = crypto_box::encrypt(&padded, &nonce, &peer_pk, &self_sk)?;

    // The nonce travels with the ciphertext so the receiver can decrypt
    // without a separate channel: nonce || ciphertext, then base64.
    let mut wire = Vec::with_capacity(nonce.len() + ciphertext.len());
    wire.extend_from_slice(&nonce);
    wire.extend_from_slice(&ciphertext);

    use base64::Engine;
    Ok(base64::engine::general_purpose::STANDARD.encode(wire))
}

/// Inverse of [`encrypt_message`]: base64-decode, split the nonce,
/// decrypt, and strip padding.
pub fn decrypt_message(wire_text: &str, sender_pk: [u8; 32], self_sk: [u8; 32]) -> Result<Vec<u8>> {
    use base64::Engine;
    let wire = base64::engine::general_purpose::STANDARD
        .decode(wire_text)
        .map_err(|e| MessagingError::Validation(format!("invalid base64 message: {e}")))?;

    if wire.len() < 24 {
        return Err(MessagingError::Validation("ciphertext too short to carry a nonce".into()));
    }
    let mut nonce = [0u8; 24];
    nonce.copy_from_slice(&wire[..24]);
    let ciphertext = &wire[24..];

    let sender_pk = X25519PublicKey::from_bytes(sender_pk);
    let self_sk = X25519StaticSecret::from_bytes(self_sk);
    let padded = crypto_box::decrypt(ciphertext, &nonce, &sender_pk, &self_sk)?;

    Ok(padding::unpad(&padded)?)
}
