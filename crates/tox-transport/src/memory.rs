//! An in-process transport, for deterministic tests (§9 "Time as a
//! dependency" applies the same logic here: tests should not depend on
//! real sockets any more than they depend on the wall clock).
//!
//! Every [`MemoryTransport`] registers itself with a shared [`MemoryNetwork`]
//! keyed by address; `send` looks the destination up in that registry and
//! invokes its handler directly, in-process. Tests can additionally mark
//! specific addresses as failing, to simulate the partial-failure
//! scenarios §8's broadcast tests require.
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};

use tox_types::traits::Addr;

use crate::{BoxFuture, Handler, Packet, Result, Transport, TransportError};

#[derive(Default)]
struct Registry {
    nodes: HashMap<Addr, Arc<Node>>,
    failing: std::collections::HashSet<Addr>,
}

/// Shared registry every [`MemoryTransport`] in a test network joins.
#[derive(Default, Clone)]
pub struct MemoryNetwork {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `addr` fail with [`TransportError::NoRoute`]
    /// until [`MemoryNetwork::clear_failure`] is called, regardless of
    /// whether a transport is registered at that address.
    pub fn fail(&self, addr: Addr) {
        self.registry.lock().expect("registry lock").failing.insert(addr);
    }

    pub fn clear_failure(&self, addr: &Addr) {
        self.registry.lock().expect("registry lock").failing.remove(addr);
    }
}

struct Node {
    handlers: RwLock<HashMap<u8, Handler>>,
    closed: std::sync::atomic::AtomicBool,
}

/// A `Transport` that delivers packets by direct in-process call instead
/// of real I/O.
pub struct MemoryTransport {
    addr: Addr,
    network: MemoryNetwork,
    node: Arc<Node>,
}

impl MemoryTransport {
    pub fn new(network: MemoryNetwork, addr: Addr) -> Self {
        let node = Arc::new(Node {
            handlers: RwLock::new(HashMap::new()),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        network
            .registry
            .lock()
            .expect("registry lock")
            .nodes
            .insert(addr.clone(), node.clone());
        Self { addr, network, node }
    }
}

impl Transport for MemoryTransport {
    fn send<'a>(&'a self, packet: Packet, addr: &'a Addr) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.node.closed.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }

            let target = {
                let registry = self.network.registry.lock().expect("registry lock");
                if registry.failing.contains(addr) {
                    return Err(TransportError::NoRoute(addr.clone()));
                }
                registry.nodes.get(addr).cloned()
            };

            let target = target.ok_or_else(|| TransportError::NoRoute(addr.clone()))?;
            if target.closed.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(TransportError::NoRoute(addr.clone()));
            }

            let handler = {
                let handlers = target.handlers.read().expect("handlers lock");
                handlers.get(&packet.tag).cloned()
            };

            match handler {
                Some(handler) => handler(packet, self.addr.clone()).await,
                None => Ok(()),
            }
        })
    }

    fn register_handler(&self, tag: u8, handler: Handler) {
        self.node
            .handlers
            .write()
            .expect("handlers lock")
            .insert(tag, handler);
    }

    fn local_addr(&self) -> Addr {
        self.addr.clone()
    }

    fn close<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.node.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            self.network
                .registry
                .lock()
                .expect("registry lock")
                .nodes
                .remove(&self.addr);
            Ok(())
        })
    }

    fn is_connection_oriented(&self) -> bool {
        false
    }
}

/// Helper to build a `Handler` from an async closure, used pervasively in
/// tests that register a tag handler inline.
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Packet, Addr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |packet, addr| Box::pin(f(packet, addr)) as Pin<Box<dyn Future<Output = Result<()>> + Send>>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn delivers_to_registered_handler() {
        let net = MemoryNetwork::new();
        let alice = MemoryTransport::new(net.clone(), "alice".to_string());
        let bob = MemoryTransport::new(net.clone(), "bob".to_string());

        let received = Arc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        bob.register_handler(
            0x01,
            handler(move |_packet, _addr| {
                received2.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
        );

        alice
            .send(Packet::new(0x01, vec![1, 2, 3]), &"bob".to_string())
            .await
            .expect("send");

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_to_unknown_address_fails() {
        let net = MemoryNetwork::new();
        let alice = MemoryTransport::new(net, "alice".to_string());

        let err = alice
            .send(Packet::new(0x01, vec![]), &"nobody".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoRoute(_)));
    }

    #[tokio::test]
    async fn marked_failing_address_fails_even_if_registered() {
        let net = MemoryNetwork::new();
        let alice = MemoryTransport::new(net.clone(), "alice".to_string());
        let _bob = MemoryTransport::new(net.clone(), "bob".to_string());
        net.fail("bob".to_string());

        let err = alice
            .send(Packet::new(0x01, vec![]), &"bob".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoRoute(_)));
    }

    #[tokio::test]
    async fn closed_transport_rejects_sends() {
        let net = MemoryNetwork::new();
        let alice = MemoryTransport::new(net, "alice".to_string());
        alice.close().await.expect("close");

        let err = alice
            .send(Packet::new(0x01, vec![]), &"bob".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
