//! The messaging engine (SPEC_FULL §4.2): per-message state machine,
//! retry/backoff, encryption, traffic-analysis padding, and optional
//! persistence.
//!
//! - [`padding`] — the length-prefix-then-zero-pad scheme shared with
//!   `tox-async` (§4.2, §4.5).
//! - [`crypto`] — wraps `tox-crypto`'s `crypto_box` with padding and the
//!   base64 wire encoding §4.2 mandates.
//! - [`engine`] — [`engine::MessagingEngine`], the public contract.

pub mod crypto;
pub mod engine;
pub mod padding;

pub use engine::{MessagingEngine, RetryConfig};

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("message not found: {0}")]
    NotFound(u64),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("no encryption configured for this send")]
    NoEncryption,

    #[error("crypto error: {0}")]
    Crypto(#[from] tox_crypto::CryptoError),

    #[error("padding error: {0}")]
    Padding(#[from] padding::PaddingError),

    #[error("transport error: {0}")]
    Transport(#[from] tox_transport::TransportError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("retries exhausted for message {0}")]
    Exhausted(u64),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

impl From<tox_types::error::TypesError> for MessagingError {
    fn from(e: tox_types::error::TypesError) -> Self {
        MessagingError::Storage(e.to_string())
    }
}
