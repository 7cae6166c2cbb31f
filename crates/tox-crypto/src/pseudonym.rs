//! Per-epoch pseudonym derivation for async (offline) messaging (§4.5, §9).
//!
//! The storage node never sees a principal's real public key, only a
//! rotating pseudonym derived from the principal's private key and an
//! epoch identifier. Derivation is deterministic for a given (key, epoch)
//! and unlinkable across epochs without the private key, since BLAKE3's
//! keyed-derivation mode is a PRF over the input material.

use crate::blake3::{self, contexts};
use crate::x25519::X25519StaticSecret;

/// Derive the pseudonym a principal presents to the storage node during
/// `epoch`. Resolves the open question in SPEC_FULL §9: `blake3::derive_key`
/// over `self_secret_key || epoch_be` under a dedicated context string.
pub fn derive(self_sk: &X25519StaticSecret, epoch: u64) -> [u8; 32] {
    let mut material = Vec::with_capacity(32 + 8);
    material.extend_from_slice(&self_sk.to_bytes());
    material.extend_from_slice(&epoch.to_be_bytes());
    blake3::derive_key(contexts::ASYNC_PSEUDONYM, &material)
}
