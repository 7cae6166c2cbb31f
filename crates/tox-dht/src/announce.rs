//! Group announcement dissemination over the DHT (§4.4). The routing
//! table doubles as the "network" this process can reach: `announce_group`
//! records locally and best-effort replicates to every currently-known
//! node; `query_group` asks those same nodes and returns once the query
//! is sent — the answer, if any, arrives later through
//! [`handle_group_query_response`], exactly as §4.4 describes
//! ("asynchronous; responses flow through a registered callback").

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tox_transport::{packet, BoxFuture, Handler, Packet, Transport};
use tox_types::group::{GroupAnnouncement, GroupId};
use tox_types::traits::Addr;

use crate::routing::RoutingTable;
use crate::{DhtError, Node, NodeId, Result};

/// Invoked once per inbound `GroupQueryResponse` packet, with whatever
/// announcement the remote side sent back. Installed once per process
/// (§4.4); the group layer is responsible for demultiplexing by
/// `announcement.group_id` to the caller actually waiting on it.
pub type GroupResponseCallback = Arc<dyn Fn(GroupAnnouncement) + Send + Sync>;

fn group_node_id(group_id: GroupId) -> NodeId {
    tox_crypto::blake3::hash(&group_id.to_be_bytes())
}

#[derive(Serialize, Deserialize)]
struct AnnouncePayload {
    announcement: GroupAnnouncement,
}

#[derive(Serialize, Deserialize)]
struct QueryPayload {
    group_id: GroupId,
    requester_addr: Addr,
}

#[derive(Serialize, Deserialize)]
struct ResponsePayload {
    announcement: GroupAnnouncement,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| DhtError::Malformed(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| DhtError::Malformed(e.to_string()))
}

/// The contract-level DHT surface a group/async layer is built against
/// (§4.4). Kept as a trait so callers depend on the interface, not on
/// [`InMemoryDht`] specifically, consistent with the transport contract.
pub trait Dht: Send + Sync {
    fn find_closest_nodes(&self, target: NodeId, k: usize) -> Vec<Node>;
    fn add_node(&self, node: Node);

    fn announce_group<'a>(
        &'a self,
        announcement: GroupAnnouncement,
        transport: &'a dyn Transport,
    ) -> BoxFuture<'a, Result<()>>;

    fn query_group<'a>(
        &'a self,
        group_id: GroupId,
        transport: &'a dyn Transport,
    ) -> BoxFuture<'a, Result<()>>;

    fn set_group_response_callback(&self, callback: GroupResponseCallback);

    fn handle_group_query_response(&self, announcement: GroupAnnouncement);
}

/// A single-process DHT: a flat routing table plus the set of group
/// announcements this process personally serves. Multiple instances
/// wired to a shared [`tox_transport::memory::MemoryNetwork`] and each
/// other's addresses behave like independent peers for integration
/// tests.
pub struct InMemoryDht {
    routing: RoutingTable,
    served: RwLock<HashMap<GroupId, GroupAnnouncement>>,
    callback: RwLock<Option<GroupResponseCallback>>,
}

impl Default for InMemoryDht {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDht {
    pub fn new() -> Self {
        Self {
            routing: RoutingTable::new(),
            served: RwLock::new(HashMap::new()),
            callback: RwLock::new(None),
        }
    }

    /// Entry point for an inbound `GroupAnnounce` packet: caches the
    /// announcement so a later query this process receives can be
    /// served without a further round trip.
    pub fn handle_group_announce(&self, announcement: GroupAnnouncement) {
        self.served.write().expect("served lock").insert(announcement.group_id, announcement);
    }

    /// Entry point for an inbound `GroupQuery` packet: if this process
    /// serves that group, sends a `GroupQueryResponse` back to the
    /// requester. Silent no-op if the group is unknown here.
    pub async fn handle_group_query(
        &self,
        group_id: GroupId,
        requester_addr: Addr,
        transport: &dyn Transport,
    ) -> Result<()> {
        let announcement = self.served.read().expect("served lock").get(&group_id).cloned();
        let Some(announcement) = announcement else {
            return Ok(());
        };
        let payload = encode(&ResponsePayload { announcement })?;
        transport
            .send(Packet::new(packet::GROUP_QUERY_RESPONSE, payload), &requester_addr)
            .await?;
        Ok(())
    }

    /// A [`Handler`] for the `GroupAnnounce` tag, for wiring into a
    /// `Transport::register_handler` call. Takes `Arc<Self>` so the
    /// handler closure can outlive the caller's stack frame; clone the
    /// `Arc` at the call site if it is still needed afterward.
    pub fn announce_handler(self: Arc<Self>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let dht = self.clone();
            async move {
                let payload: AnnouncePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                dht.handle_group_announce(payload.announcement);
                Ok(())
            }
        })
    }

    /// A [`Handler`] for the `GroupQuery` tag.
    pub fn query_handler(self: Arc<Self>, transport: Arc<dyn Transport>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let dht = self.clone();
            let transport = transport.clone();
            async move {
                let payload: QueryPayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                dht.handle_group_query(payload.group_id, payload.requester_addr, transport.as_ref())
                    .await
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))
            }
        })
    }

    /// A [`Handler`] for the `GroupQueryResponse` tag: decodes the
    /// announcement and drives it through [`Dht::handle_group_query_response`].
    pub fn response_handler(self: Arc<Self>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let dht = self.clone();
            async move {
                let payload: ResponsePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                dht.handle_group_query_response(payload.announcement);
                Ok(())
            }
        })
    }
}

impl Dht for InMemoryDht {
    fn find_closest_nodes(&self, target: NodeId, k: usize) -> Vec<Node> {
        self.routing.find_closest_nodes(&target, k)
    }

    fn add_node(&self, node: Node) {
        self.routing.add_node(node);
    }

    fn announce_group<'a>(
        &'a self,
        announcement: GroupAnnouncement,
        transport: &'a dyn Transport,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let group_id = announcement.group_id;
            self.served.write().expect("served lock").insert(group_id, announcement.clone());

            let payload = encode(&AnnouncePayload { announcement })?;
            let target = group_node_id(group_id);
            for node in self.routing.find_closest_nodes(&target, self.routing.len()) {
                let packet = Packet::new(packet::GROUP_ANNOUNCE, payload.clone());
                if let Err(e) = transport.send(packet, &node.address).await {
                    tracing::debug!(address = %node.address, error = %e, "group announce delivery failed");
                }
            }
            Ok(())
        })
    }

    fn query_group<'a>(
        &'a self,
        group_id: GroupId,
        transport: &'a dyn Transport,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let target = group_node_id(group_id);
            let candidates = self.routing.find_closest_nodes(&target, self.routing.len());
            if candidates.is_empty() {
                return Err(DhtError::NoRoute(group_id));
            }

            let payload = encode(&QueryPayload {
                group_id,
                requester_addr: transport.local_addr(),
            })?;
            for node in candidates {
                let packet = Packet::new(packet::GROUP_QUERY, payload.clone());
                if let Err(e) = transport.send(packet, &node.address).await {
                    tracing::debug!(address = %node.address, error = %e, "group query send failed");
                }
            }
            Ok(())
        })
    }

    fn set_group_response_callback(&self, callback: GroupResponseCallback) {
        *self.callback.write().expect("callback lock") = Some(callback);
    }

    fn handle_group_query_response(&self, announcement: GroupAnnouncement) {
        let callback = self.callback.read().expect("callback lock").clone();
        if let Some(callback) = callback {
            callback(announcement);
        } else {
            tracing::trace!("group query response received with no callback installed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tox_transport::memory::{MemoryNetwork, MemoryTransport};
    use tox_types::group::{ChatType, Privacy};

    fn announcement(group_id: GroupId) -> GroupAnnouncement {
        GroupAnnouncement {
            group_id,
            name: "test group".into(),
            chat_type: ChatType::Text,
            privacy: Privacy::Public,
            timestamp: 1,
            ttl: 3600,
        }
    }

    fn node_for(addr: &str) -> Node {
        Node {
            id: tox_crypto::blake3::hash(addr.as_bytes()),
            address: addr.to_string(),
            public_key: [0u8; 32],
        }
    }

    #[test]
    fn find_closest_nodes_delegates_to_routing_table() {
        let dht = InMemoryDht::new();
        dht.add_node(node_for("alice"));
        let found = dht.find_closest_nodes(group_node_id(1), 5);
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn query_group_without_known_nodes_fails_fast() {
        let net = MemoryNetwork::new();
        let transport = MemoryTransport::new(net, "alice".to_string());
        let dht = InMemoryDht::new();

        let err = dht.query_group(42, &transport).await.unwrap_err();
        assert!(matches!(err, DhtError::NoRoute(42)));
    }

    #[tokio::test]
    async fn announce_then_query_round_trips_through_two_peers() {
        let net = MemoryNetwork::new();
        let announcer = Arc::new(InMemoryDht::new());
        let querier = Arc::new(InMemoryDht::new());

        let announcer_transport: Arc<dyn Transport> =
            Arc::new(MemoryTransport::new(net.clone(), "announcer".to_string()));
        let querier_transport: Arc<dyn Transport> =
            Arc::new(MemoryTransport::new(net.clone(), "querier".to_string()));

        announcer_transport.register_handler(
            packet::GROUP_QUERY,
            announcer.clone().query_handler(announcer_transport.clone()),
        );
        querier_transport.register_handler(packet::GROUP_QUERY_RESPONSE, querier.clone().response_handler());

        querier.add_node(node_for("announcer"));

        let received = Arc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        querier.set_group_response_callback(Arc::new(move |ann| {
            assert_eq!(ann.group_id, 7);
            received2.fetch_add(1, Ordering::SeqCst);
        }));

        announcer
            .announce_group(announcement(7), announcer_transport.as_ref())
            .await
            .expect("announce");

        querier.query_group(7, querier_transport.as_ref()).await.expect("query");

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_for_unknown_group_gets_no_response() {
        let net = MemoryNetwork::new();
        let server = Arc::new(InMemoryDht::new());
        let server_transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "server".to_string()));
        server_transport.register_handler(packet::GROUP_QUERY, server.clone().query_handler(server_transport.clone()));

        let querier = Arc::new(InMemoryDht::new());
        let querier_transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "querier".to_string()));
        querier_transport.register_handler(packet::GROUP_QUERY_RESPONSE, querier.clone().response_handler());
        querier.add_node(node_for("server"));

        let received = Arc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        querier.set_group_response_callback(Arc::new(move |_| {
            received2.fetch_add(1, Ordering::SeqCst);
        }));

        querier.query_group(999, querier_transport.as_ref()).await.expect("query sent");
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }
}
