//! Shared domain types for the Tox-like core: identity, friend/request,
//! message, group, and async-message entities, plus the cross-cutting
//! collaborator traits (`TimeProvider`, `KeyProvider`, `MessageStore`,
//! `FriendAddressResolver`) every higher-level crate is built against.

pub mod async_message;
pub mod error;
pub mod friend;
pub mod group;
pub mod identity;
pub mod message;
pub mod traits;

pub use error::{Result, TypesError};

/// Protocol constant: largest plaintext a friend message may carry (§6).
pub const MAX_PLAINTEXT_MESSAGE: usize = 1372;
/// AEAD authenticator tag overhead added on encryption.
pub const ENCRYPTION_OVERHEAD: usize = 16;
/// Largest on-wire ciphertext a friend message may carry.
pub const MAX_ENCRYPTED_MESSAGE: usize = MAX_PLAINTEXT_MESSAGE + ENCRYPTION_OVERHEAD;
/// Largest payload the async storage node will accept.
pub const MAX_STORAGE_MESSAGE: usize = 16384;
/// Hard ceiling for any single buffer, to bound worst-case allocation.
pub const MAX_PROCESSING_BUFFER: usize = 1024 * 1024;

/// Padding tiers for messaging-sized payloads (§4.2).
pub const MESSAGE_PADDING_TIERS: [usize; 3] = [256, 1024, 4096];
/// Padding tiers for storage-sized payloads (§4.5); adds the 16 KiB storage tier.
pub const STORAGE_PADDING_TIERS: [usize; 4] = [256, 1024, 4096, 16384];

/// Pick the smallest tier in `tiers` that is `>= len`, or `None` if `len`
/// exceeds every tier (the caller should leave the plaintext unpadded then).
pub fn padded_length(len: usize, tiers: &[usize]) -> Option<usize> {
    tiers.iter().copied().find(|&tier| tier >= len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_length_picks_least_sufficient_tier() {
        assert_eq!(padded_length(0, &MESSAGE_PADDING_TIERS), Some(256));
        assert_eq!(padded_length(256, &MESSAGE_PADDING_TIERS), Some(256));
        assert_eq!(padded_length(257, &MESSAGE_PADDING_TIERS), Some(1024));
        assert_eq!(padded_length(4096, &MESSAGE_PADDING_TIERS), Some(4096));
        assert_eq!(padded_length(4097, &MESSAGE_PADDING_TIERS), None);
        assert_eq!(padded_length(5000, &STORAGE_PADDING_TIERS), Some(16384));
    }
}
