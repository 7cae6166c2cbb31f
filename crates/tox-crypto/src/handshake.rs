//! A one-shot Noise-IK-equivalent handshake (§4.1, §10.2).
//!
//! The friend-request protocol picks this over [`crate::crypto_box`] when
//! the recipient advertises Noise-IK support: an ephemeral X25519 keypair
//! is generated per request, DH'd against the recipient's long-term static
//! key, and the resulting transport key seals the request payload with
//! the ephemeral public key bound in as associated data. This is the
//! minimal shape that satisfies "one-shot handshake embedding the request
//! payload" without pulling in a dedicated Noise protocol library — no
//! other part of this workspace's dependency stack needs one.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::blake3::{self, contexts};
use crate::chacha20;
use crate::x25519::{self, X25519PublicKey, X25519StaticSecret};
use crate::{CryptoError, Result};

/// The wire form of a sealed handshake message: `ephemeral_pk || nonce ||
/// ciphertext_and_tag`. This is the `noise_handshake_message` referenced
/// by the Noise packet layout in §4.1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandshakeMessage {
    pub ephemeral_pk: [u8; 32],
    pub nonce: [u8; chacha20::NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl HandshakeMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + chacha20::NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.ephemeral_pk);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header_len = 32 + chacha20::NONCE_SIZE;
        if data.len() < header_len + chacha20::TAG_SIZE {
            return Err(CryptoError::InvalidInput(
                "handshake message too short".into(),
            ));
        }
        let mut ephemeral_pk = [0u8; 32];
        ephemeral_pk.copy_from_slice(&data[..32]);
        let mut nonce = [0u8; chacha20::NONCE_SIZE];
        nonce.copy_from_slice(&data[32..header_len]);
        Ok(Self {
            ephemeral_pk,
            nonce,
            ciphertext: data[header_len..].to_vec(),
        })
    }
}

/// Seal `payload` for `recipient_pk`, generating a fresh ephemeral keypair.
pub fn seal(payload: &[u8], recipient_pk: &X25519PublicKey) -> Result<HandshakeMessage> {
    let (ephemeral_pk, shared) = x25519::ephemeral_key_exchange(recipient_pk);
    let transport_key = blake3::derive_key(contexts::HANDSHAKE_TRANSPORT_KEY, shared.as_bytes());

    let mut nonce = [0u8; chacha20::NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = chacha20::encrypt(&transport_key, &nonce, payload, &ephemeral_pk.to_bytes())?;

    Ok(HandshakeMessage {
        ephemeral_pk: ephemeral_pk.to_bytes(),
        nonce,
        ciphertext,
    })
}

/// Open a handshake message sealed for us, given our static secret.
pub fn open(msg: &HandshakeMessage, self_sk: &X25519StaticSecret) -> Result<Vec<u8>> {
    let ephemeral_pk = X25519PublicKey::from_bytes(msg.ephemeral_pk);
    let shared = self_sk.diffie_hellman(&ephemeral_pk);
    let transport_key = blake3::derive_key(contexts::HANDSHAKE_TRANSPORT_KEY, shared.as_bytes());

    chacha20::decrypt(&transport_key, &msg.nonce, &msg.ciphertext, &msg.ephemeral_pk)
}
