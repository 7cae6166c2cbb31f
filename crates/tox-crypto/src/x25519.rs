//! X25519 key agreement (RFC 7748), used for identity keys and the
//! `crypto_box`/handshake primitives built on top of it.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroize;

/// A long-lived X25519 secret key.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct X25519StaticSecret {
    inner: StaticSecret,
}

/// An X25519 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey {
    bytes: [u8; 32],
}

/// The output of a Diffie-Hellman agreement.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl X25519StaticSecret {
    pub fn random() -> Self {
        Self {
            inner: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            inner: StaticSecret::from(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey {
            bytes: PublicKey::from(&self.inner).to_bytes(),
        }
    }

    pub fn diffie_hellman(&self, their_public: &X25519PublicKey) -> SharedSecret {
        let pk = PublicKey::from(their_public.bytes);
        let shared = self.inner.diffie_hellman(&pk);
        SharedSecret {
            bytes: *shared.as_bytes(),
        }
    }
}

impl X25519PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Ephemeral X25519 exchange: generates a fresh keypair, performs DH
/// against `their_public`, and returns the ephemeral public key alongside
/// the shared secret. Used by [`crate::handshake`] for the one-shot
/// Noise-IK-equivalent construction.
pub fn ephemeral_key_exchange(their_public: &X25519PublicKey) -> (X25519PublicKey, SharedSecret) {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let pk = PublicKey::from(their_public.bytes);
    let shared = secret.diffie_hellman(&pk);

    (
        X25519PublicKey {
            bytes: public.to_bytes(),
        },
        SharedSecret {
            bytes: *shared.as_bytes(),
        },
    )
}

/// Basepoint multiplication: recover the public key for a raw secret.
pub fn basepoint_mult(secret: &[u8; 32]) -> [u8; 32] {
    PublicKey::from(&StaticSecret::from(*secret)).to_bytes()
}
