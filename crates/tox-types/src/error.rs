//! Error taxonomy shared by the data-model layer.
//!
//! Higher layers (`tox-friend`, `tox-group`, `tox-messaging`, `tox-async`)
//! define their own error enums and convert into/from this one with
//! `#[from]`, following the per-crate `thiserror` pattern used throughout
//! this workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TypesError>;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl TypesError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
