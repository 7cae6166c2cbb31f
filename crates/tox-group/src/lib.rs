//! Group-chat engine (§4.3): membership, role-based permissions,
//! invitations, DHT-assisted peer discovery, and the parallel broadcast
//! worker pool.

pub mod broadcast;
pub mod invite;
pub mod manager;
pub mod registry;

pub use manager::GroupManager;

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("transport error: {0}")]
    Transport(#[from] tox_transport::TransportError),

    #[error("dht error: {0}")]
    Dht(#[from] tox_dht::DhtError),

    #[error("underlying data error: {0}")]
    Types(#[from] tox_types::error::TypesError),
}

pub type Result<T> = std::result::Result<T, GroupError>;
