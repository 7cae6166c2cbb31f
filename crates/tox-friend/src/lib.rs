//! The friend & friend-request layer (SPEC_FULL §4.1, §3 "Friend",
//! "Friend Request"): the authenticated friendship handshake and the
//! friend entity itself.
//!
//! - [`request`] — the wire protocol: building, encrypting, and
//!   decrypting a friend request packet (legacy crypto_box or one-shot
//!   Noise-IK, chosen by recipient capability).
//! - [`request_manager`] — [`request_manager::RequestManager`], the
//!   thread-safe collaborator that tracks pending requests and fans
//!   accept/reject decisions out to a caller-supplied handler.
//! - [`manager`] — [`manager::FriendManager`], the entity store for
//!   established friends.

pub mod manager;
pub mod request;
pub mod request_manager;

pub use manager::FriendManager;
pub use request_manager::RequestManager;

#[derive(Debug, thiserror::Error)]
pub enum FriendError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] tox_crypto::CryptoError),

    #[error("malformed packet: {0}")]
    InvalidPacket(String),
}

pub type Result<T> = std::result::Result<T, FriendError>;

impl From<tox_types::error::TypesError> for FriendError {
    fn from(e: tox_types::error::TypesError) -> Self {
        FriendError::Validation(e.to_string())
    }
}
