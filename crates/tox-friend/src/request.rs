//! Friend-request packet protocol (§4.1).
//!
//! Two wire forms, chosen by the recipient's advertised capabilities:
//!
//! - **Legacy**: `[0x00][sender_pk:32][nonce:24][ciphertext]`, sealed with
//!   the `crypto_box`-equivalent cipher. The plaintext is JSON
//!   `{message, timestamp, capabilities?}`, or — for a sender that has
//!   never heard of capabilities — raw message bytes.
//! - **Noise**: `[0x01][sender_pk:32][length:4 BE][noise_handshake_message]`,
//!   sealed with the one-shot Noise-IK-equivalent handshake.
//!
//! [`decrypt`] infers the protocol from the first byte and additionally
//! accepts a legacy packet with no tag byte at all (just
//! `sender_pk || nonce || ciphertext`), for interoperability with senders
//! predating the tag prefix.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use tox_crypto::handshake::HandshakeMessage;
use tox_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use tox_crypto::{chacha20, crypto_box, handshake};
use tox_types::friend::{FriendRequest, RequestProtocol, MAX_REQUEST_MESSAGE_LEN};
use tox_types::identity::KeyPair;

use crate::{FriendError, Result};

/// Capability string a peer advertises to mean "I understand the Noise-IK
/// wire form of friend requests".
pub const CAP_NOISE_IK: &str = "noise-ik";

const TAG_LEGACY: u8 = 0x00;
const TAG_NOISE: u8 = 0x01;

#[derive(Serialize, Deserialize)]
struct RequestPayload {
    message: String,
    timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<Vec<String>>,
}

/// Build a (not yet encrypted) request from `sender_keypair` addressed to
/// `recipient_pk`, carrying `message` and optional `capabilities`.
pub fn new_request(
    recipient_pk: [u8; 32],
    message: impl Into<String>,
    sender_keypair: &KeyPair,
    capabilities: Option<Vec<String>>,
) -> Result<FriendRequest> {
    let message = message.into();
    FriendRequest::validate_message(&message).map_err(FriendError::from)?;

    let mut nonce = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let _ = recipient_pk; // addressing is carried by the caller at encrypt time

    Ok(FriendRequest {
        sender_pk: sender_keypair.public,
        message,
        nonce,
        timestamp: 0,
        handled: false,
        protocol: RequestProtocol::Legacy,
        capabilities,
        session_handle: None,
    })
}

/// Seal `request` for `recipient_pk`. Picks the Noise wire form if
/// `recipient_capabilities` advertises [`CAP_NOISE_IK`], otherwise falls
/// back to the legacy `crypto_box` form — silently, per §7's "friend
/// request to unknown capability peer: silently falls back to legacy".
pub fn encrypt(
    request: &FriendRequest,
    sender_keypair: &KeyPair,
    recipient_pk: [u8; 32],
    recipient_capabilities: &[String],
) -> Result<Vec<u8>> {
    if request.message.is_empty() || request.message.len() > MAX_REQUEST_MESSAGE_LEN {
        return Err(FriendError::Validation(format!(
            "request message must be 1..={MAX_REQUEST_MESSAGE_LEN} bytes"
        )));
    }

    let payload = RequestPayload {
        message: request.message.clone(),
        timestamp: request.timestamp,
        capabilities: request.capabilities.clone(),
    };
    let plaintext = serde_json::to_vec(&payload)
        .map_err(|e| FriendError::Validation(format!("failed to serialize request: {e}")))?;

    let use_noise = recipient_capabilities.iter().any(|c| c == CAP_NOISE_IK);
    let recipient_pk = X25519PublicKey::from_bytes(recipient_pk);

    if use_noise {
        let sealed = handshake::seal(&plaintext, &recipient_pk)?;
        let handshake_bytes = sealed.to_bytes();
        let mut out = Vec::with_capacity(1 + 32 + 4 + handshake_bytes.len());
        out.push(TAG_NOISE);
        out.extend_from_slice(&sender_keypair.public);
        out.extend_from_slice(&(handshake_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&handshake_bytes);
        Ok(out)
    } else {
        let self_sk = X25519StaticSecret::from_bytes(sender_keypair.private);
        let ciphertext = crypto_box::encrypt(&plaintext, &request.nonce, &recipient_pk, &self_sk)?;
        let mut out = Vec::with_capacity(1 + 32 + 24 + ciphertext.len());
        out.push(TAG_LEGACY);
        out.extend_from_slice(&sender_keypair.public);
        out.extend_from_slice(&request.nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

/// Decrypt an inbound friend-request packet with `recipient_keypair`,
/// inferring the protocol from the tag byte (or its absence, for legacy
/// senders that never prepended one).
pub fn decrypt(packet: &[u8], recipient_keypair: &KeyPair) -> Result<FriendRequest> {
    if packet.len() >= 1 + 32 + chacha20::NONCE_SIZE && packet[0] == TAG_NOISE {
        return decrypt_noise(packet, recipient_keypair);
    }
    if packet.len() >= 1 + 32 + chacha20::NONCE_SIZE && packet[0] == TAG_LEGACY {
        return decrypt_legacy(&packet[1..], recipient_keypair, RequestProtocol::Legacy);
    }
    // No recognized tag: fall back to the untagged legacy form
    // (sender_pk || nonce || ciphertext), for backward compatibility.
    decrypt_legacy(packet, recipient_keypair, RequestProtocol::Legacy)
}

fn decrypt_legacy(body: &[u8], recipient_keypair: &KeyPair, protocol: RequestProtocol) -> Result<FriendRequest> {
    if body.len() < 32 + chacha20::NONCE_SIZE {
        return Err(FriendError::InvalidPacket("legacy request too short".into()));
    }
    let mut sender_pk = [0u8; 32];
    sender_pk.copy_from_slice(&body[..32]);
    let mut nonce = [0u8; 24];
    nonce.copy_from_slice(&body[32..32 + chacha20::NONCE_SIZE]);
    let ciphertext = &body[32 + chacha20::NONCE_SIZE..];

    let sender_pub = X25519PublicKey::from_bytes(sender_pk);
    let self_sk = X25519StaticSecret::from_bytes(recipient_keypair.private);
    let plaintext = crypto_box::decrypt(ciphertext, &nonce, &sender_pub, &self_sk)?;

    let (message, timestamp, capabilities) = decode_payload_or_raw(&plaintext)?;

    Ok(FriendRequest {
        sender_pk,
        message,
        nonce,
        timestamp,
        handled: false,
        protocol,
        capabilities,
        session_handle: None,
    })
}

fn decrypt_noise(packet: &[u8], recipient_keypair: &KeyPair) -> Result<FriendRequest> {
    let header_len = 1 + 32 + 4;
    if packet.len() < header_len {
        return Err(FriendError::InvalidPacket("noise request header too short".into()));
    }
    let mut sender_pk = [0u8; 32];
    sender_pk.copy_from_slice(&packet[1..33]);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&packet[33..37]);
    let length = u32::from_be_bytes(len_bytes) as usize;

    if packet.len() < header_len + length {
        return Err(FriendError::InvalidPacket("noise request body truncated".into()));
    }
    let handshake_bytes = &packet[header_len..header_len + length];
    let sealed = HandshakeMessage::from_bytes(handshake_bytes)?;

    let self_sk = X25519StaticSecret::from_bytes(recipient_keypair.private);
    let plaintext = handshake::open(&sealed, &self_sk)?;

    let (message, timestamp, capabilities) = decode_payload_or_raw(&plaintext)?;

    Ok(FriendRequest {
        sender_pk,
        message,
        nonce: [0u8; 24],
        timestamp,
        handled: false,
        protocol: RequestProtocol::Noise,
        capabilities,
        session_handle: None,
    })
}

/// The plaintext is JSON `{message, timestamp, capabilities?}` for
/// capability-aware senders, or raw message bytes for senders that
/// predate the JSON envelope (§4.1).
fn decode_payload_or_raw(plaintext: &[u8]) -> Result<(String, u64, Option<Vec<String>>)> {
    if let Ok(payload) = serde_json::from_slice::<RequestPayload>(plaintext) {
        return Ok((payload.message, payload.timestamp, payload.capabilities));
    }
    let message = String::from_utf8(plaintext.to_vec())
        .map_err(|e| FriendError::InvalidPacket(format!("non-utf8 legacy message: {e}")))?;
    Ok((message, 0, None))
}
