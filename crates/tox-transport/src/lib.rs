//! The pluggable transport contract (§5, §6 "Transport") and two concrete
//! implementations: an in-process [`memory`] transport for deterministic
//! tests, and a [`udp`] transport for real networks.
//!
//! Everything above this crate (`tox-friend`, `tox-group`, `tox-messaging`,
//! `tox-async`) depends only on the [`Transport`] trait, never on a
//! concrete implementation — consistent with §9 "Polymorphism without
//! inheritance".

pub mod memory;
pub mod packet;
pub mod udp;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tox_types::traits::Addr;

pub use packet::PacketTag;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("transport is closed")]
    Closed,

    #[error("no route to {0}")]
    NoRoute(String),

    #[error("handler rejected packet: {0}")]
    HandlerRejected(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A single on-wire packet: a one-byte type tag plus its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub tag: u8,
    pub bytes: Vec<u8>,
}

impl Packet {
    pub fn new(tag: u8, bytes: Vec<u8>) -> Self {
        Self { tag, bytes }
    }
}

/// A handler invoked for every inbound packet of a given tag. Returns a
/// future so handlers can themselves await (e.g. to take a lock or issue
/// a follow-up send) without blocking the receive loop.
pub type Handler =
    Arc<dyn Fn(Packet, Addr) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// A boxed future, used to keep [`Transport`] object-safe (`Arc<dyn
/// Transport>` is shared across the friend, group, messaging, and DHT
/// layers) without pulling in a dedicated async-trait-desugaring crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The consumer-facing transport contract (§6). Implementations must be
/// safe to share across tasks (`Send + Sync`) since the messaging, group,
/// and DHT layers all hold a `dyn Transport` concurrently.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, packet: Packet, addr: &'a Addr) -> BoxFuture<'a, Result<()>>;

    /// Register (or replace) the handler for a packet tag. Only one
    /// handler may be registered per tag at a time.
    fn register_handler(&self, tag: u8, handler: Handler);

    fn local_addr(&self) -> Addr;

    fn close<'a>(&'a self) -> BoxFuture<'a, Result<()>>;

    /// Whether this transport is connection-oriented (TCP-like, so a
    /// failed send usually means the peer is genuinely unreachable) or
    /// connectionless (UDP-like, so a failed send may just mean "try
    /// again" — relevant to the group broadcast delivery strategy, §4.3).
    fn is_connection_oriented(&self) -> bool;
}
