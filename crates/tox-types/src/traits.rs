//! The collaborator traits the core is built against instead of global
//! singletons (§6, §9 "Polymorphism without inheritance"): `TimeProvider`,
//! `KeyProvider`, `MessageStore`, `FriendAddressResolver`. Every
//! higher-level crate takes these as constructor parameters.

use crate::error::Result;
use crate::friend::FriendId;

/// An abstract network address. Kept as an opaque string here so the data
/// model does not need to depend on the transport crate; `tox-transport`
/// parses/formats it as needed for the concrete transport in use.
pub type Addr = String;

/// Injectable clock (§6, §9). All "current time" reads in the messaging,
/// group, and DHT layers go through this instead of the wall clock, so
/// retry/backoff and timeout logic can be driven deterministically in
/// tests.
pub trait TimeProvider: Send + Sync {
    /// Milliseconds since an arbitrary but fixed epoch, monotonically
    /// non-decreasing for a given provider instance.
    fn now_ms(&self) -> u64;

    /// Milliseconds elapsed since `earlier` (as returned by `now_ms`).
    fn since_ms(&self, earlier: u64) -> u64 {
        self.now_ms().saturating_sub(earlier)
    }
}

/// Wall-clock `TimeProvider`, used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Supplies the keys the messaging engine needs to encrypt/decrypt: the
/// peer's long-term public key and our own long-term private key.
pub trait KeyProvider: Send + Sync {
    fn get_friend_public_key(&self, friend_id: FriendId) -> Result<[u8; 32]>;
    fn get_self_private_key(&self) -> Result<[u8; 32]>;
}

/// Optional persistence collaborator (§6). Absence of previously-saved
/// data is not an error — `load` returns `Ok(None)`.
pub trait MessageStore: Send + Sync {
    fn save(&self, bytes: &[u8]) -> Result<()>;
    fn load(&self) -> Result<Option<Vec<u8>>>;
}

/// Resolves a friend id to a network address so the group layer can send
/// an invitation packet directly, without the group crate knowing how
/// friends are stored.
pub trait FriendAddressResolver: Send + Sync {
    fn resolve(&self, friend_id: FriendId) -> Result<Addr>;
}
