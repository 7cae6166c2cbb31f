//! Async (offline) messaging (SPEC_FULL §4.5): forward-secure,
//! pseudonymous store-and-forward delivery for a recipient that is not
//! currently reachable directly.
//!
//! - [`padding`] — the same length-prefix-then-zero-pad scheme as
//!   `tox-messaging::padding`, reapplied here against the storage tiers
//!   (§4.2, §4.5) rather than shared as a cross-crate dependency, since
//!   the messaging and async layers are siblings, not a dependency of
//!   one on the other.
//! - [`prekey`] — one-time pre-key bundles (§4.1's Noise-IK handshake,
//!   reused here per §4.5) and the directory that publishes/serves them.
//! - [`wire`] — seals/opens an async-message ciphertext against a
//!   recipient's pre-key, forward-secure per-message via a fresh sender
//!   ephemeral key (§4.5, §9 "Pre-key").
//! - [`storage`] — [`storage::InMemoryStorageNode`], the pseudonymous
//!   store-and-forward collaborator (§4.5 "Storage node contract").
//! - [`manager`] — [`manager::AsyncManager`], the client-facing contract.

pub mod manager;
pub mod padding;
pub mod prekey;
pub mod storage;
pub mod wire;

pub use manager::AsyncManager;

/// Epoch length for pseudonym rotation (§4.5, §9 "Pseudonym-derivation
/// function"): one hour. A principal's pseudonym changes every epoch;
/// [`manager::AsyncManager::retrieve_messages`] checks both the current
/// and the immediately preceding epoch so a message stored just before a
/// boundary is not missed.
pub const EPOCH_DURATION_MS: u64 = 3_600_000;

/// Per-recipient message capacity enforced by [`storage::InMemoryStorageNode`]
/// (§4.5 "enforces per-recipient capacity").
pub const STORAGE_CAPACITY_PER_RECIPIENT: usize = 256;

/// Default message TTL applied by [`storage::InMemoryStorageNode::store`] when the
/// caller does not specify one: 14 days.
pub const DEFAULT_MESSAGE_TTL_SECS: u64 = 14 * 24 * 3600;

/// Default timeout for a pre-key directory query (mirrors
/// `tox-group`'s default 2s DHT query timeout, §4.3/§4.4).
pub const DEFAULT_PREKEY_QUERY_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum AsyncError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no pre-keys available for the intended recipient")]
    NoPreKeys,

    #[error("storage capacity exhausted for this recipient")]
    Exhausted,

    #[error("recipient is currently online; route this message directly instead of via async storage")]
    FriendOnline,

    #[error("crypto error: {0}")]
    Crypto(#[from] tox_crypto::CryptoError),

    #[error("padding error: {0}")]
    Padding(#[from] padding::PaddingError),

    #[error("transport error: {0}")]
    Transport(#[from] tox_transport::TransportError),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("malformed wire payload: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, AsyncError>;

impl From<tox_types::error::TypesError> for AsyncError {
    fn from(e: tox_types::error::TypesError) -> Self {
        AsyncError::Validation(e.to_string())
    }
}
