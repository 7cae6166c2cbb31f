//! Per-message sealing for the async layer (§4.5): reuses
//! [`tox_crypto::handshake`]'s one-shot Noise-IK-equivalent construction so
//! every offline message carries its own fresh ephemeral key and is sealed
//! against the recipient's one-time pre-key rather than their long-term
//! identity key. The handshake's associated data only binds the ephemeral
//! key, not the sender's identity, so the sender's public key travels
//! inside the sealed envelope alongside the payload.

use serde::{Deserialize, Serialize};
use tox_crypto::handshake::{self, HandshakeMessage};
use tox_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use tox_types::async_message::AsyncMessageType;

use crate::padding;
use crate::Result;

#[derive(Serialize, Deserialize)]
struct Envelope {
    sender_pk: [u8; 32],
    msg_type: AsyncMessageType,
    payload: Vec<u8>,
}

/// What [`open`] recovers from a sealed wire payload.
pub struct OpenedMessage {
    pub sender_pk: [u8; 32],
    pub msg_type: AsyncMessageType,
    pub payload: Vec<u8>,
}

/// Seal `payload` for `recipient_prekey_pk`, padding the envelope to one
/// of `tiers` before encryption (§4.2, §4.5).
pub fn seal(
    sender_sk: &X25519StaticSecret,
    msg_type: AsyncMessageType,
    payload: &[u8],
    recipient_prekey_pk: &X25519PublicKey,
    tiers: &[usize],
) -> Result<Vec<u8>> {
    let envelope = Envelope {
        sender_pk: sender_sk.public_key().to_bytes(),
        msg_type,
        payload: payload.to_vec(),
    };
    let plaintext = serde_json::to_vec(&envelope).map_err(|e| crate::AsyncError::Malformed(e.to_string()))?;
    let padded = padding::pad(&plaintext, tiers)?;
    let sealed = handshake::seal(&padded, recipient_prekey_pk)?;
    Ok(sealed.to_bytes())
}

/// Open a sealed wire payload, given the one-time pre-key secret it was
/// addressed to.
pub fn open(sealed_bytes: &[u8], prekey_sk: &X25519StaticSecret) -> Result<OpenedMessage> {
    let msg = HandshakeMessage::from_bytes(sealed_bytes)
        .map_err(|e| crate::AsyncError::Malformed(e.to_string()))?;
    let padded = handshake::open(&msg, prekey_sk)?;
    let plaintext = padding::unpad(&padded)?;
    let envelope: Envelope =
        serde_json::from_slice(&plaintext).map_err(|e| crate::AsyncError::Malformed(e.to_string()))?;
    Ok(OpenedMessage {
        sender_pk: envelope.sender_pk,
        msg_type: envelope.msg_type,
        payload: envelope.payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tox_types::STORAGE_PADDING_TIERS;

    #[test]
    fn seal_open_roundtrip_carries_sender_identity() {
        let sender = X25519StaticSecret::random();
        let prekey = X25519StaticSecret::random();

        let sealed = seal(
            &sender,
            AsyncMessageType::Normal,
            b"see you offline",
            &prekey.public_key(),
            &STORAGE_PADDING_TIERS,
        )
        .expect("seal");

        let opened = open(&sealed, &prekey).expect("open");
        assert_eq!(opened.sender_pk, sender.public_key().to_bytes());
        assert_eq!(opened.payload, b"see you offline");
        assert!(matches!(opened.msg_type, AsyncMessageType::Normal));
    }

    #[test]
    fn wrong_prekey_secret_fails_to_open() {
        let sender = X25519StaticSecret::random();
        let prekey = X25519StaticSecret::random();
        let other = X25519StaticSecret::random();

        let sealed = seal(
            &sender,
            AsyncMessageType::Normal,
            b"hi",
            &prekey.public_key(),
            &STORAGE_PADDING_TIERS,
        )
        .expect("seal");

        assert!(open(&sealed, &other).is_err());
    }

    #[test]
    fn sealed_payload_is_padded_to_a_tier() {
        let sender = X25519StaticSecret::random();
        let prekey = X25519StaticSecret::random();

        let sealed = seal(&sender, AsyncMessageType::Normal, b"x", &prekey.public_key(), &STORAGE_PADDING_TIERS)
            .expect("seal");

        // ephemeral_pk(32) + nonce(24) + padded-ciphertext-and-tag; the
        // smallest storage tier is 256 bytes of plaintext framing.
        assert_eq!(sealed.len(), 32 + 24 + 256 + 16);
    }
}
