//! `tox-runtime`: the composition layer that wires the friend, group,
//! messaging, async-messaging, and DHT crates together against one local
//! identity and one [`tox_transport::Transport`] (§10), the way
//! `ochra-daemon` wires its subsystems behind `DaemonState`. There is no
//! CLI, RPC server, or process entry point here (§1/§6 Non-goals) — this
//! crate is a library an embedding application drives.

pub mod address_book;
pub mod config;
pub mod keys;
pub mod runtime;

pub use address_book::AddressBook;
pub use config::RuntimeConfig;
pub use keys::RuntimeKeyProvider;
pub use runtime::Runtime;

use thiserror::Error;

/// Errors the composition layer itself can produce, plus every
/// subsystem error it can propagate unchanged.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid runtime configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Friend(#[from] tox_friend::FriendError),
    #[error(transparent)]
    Group(#[from] tox_group::GroupError),
    #[error(transparent)]
    Messaging(#[from] tox_messaging::MessagingError),
    #[error(transparent)]
    Async(#[from] tox_async::AsyncError),
    #[error(transparent)]
    Db(#[from] tox_db::DbError),
    #[error(transparent)]
    Transport(#[from] tox_transport::TransportError),
    #[error(transparent)]
    Dht(#[from] tox_dht::DhtError),
    #[error(transparent)]
    Types(#[from] tox_types::error::TypesError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Installs a default [`tracing_subscriber`] for convenience during
/// development and tests (§10.1). Embedding applications that configure
/// their own subscriber should not call this and should not enable the
/// `tracing-init` feature.
#[cfg(feature = "tracing-init")]
pub fn install_default_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
