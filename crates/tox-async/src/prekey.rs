//! One-time pre-key bundles and the directory that serves them (§4.5,
//! §9 "Pre-key").
//!
//! A bundle is consumed by whichever peer fetches it first, the same way
//! X3DH one-time pre-keys are meant to be used: once handed out, a bundle
//! is never served again, so a session built from it is forward-secure
//! even if the directory is later compromised. The directory itself has
//! to be reachable even while the bundle's owner is offline (that is the
//! whole point of §4.5), so it is modeled the same way `tox-dht`'s `Dht`
//! models group announcements: a plain local store plus transport
//! handlers that let any reachable peer serve as the directory for
//! whoever published to it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tox_transport::{packet, BoxFuture, Handler, Packet, Transport};
use tox_types::traits::{Addr, TimeProvider};

use crate::{AsyncError, Result};

/// A one-time pre-key bundle, published in advance by its owner so a
/// sender can bootstrap a forward-secure session while the owner is
/// offline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    pub owner_pk: [u8; 32],
    pub prekey_pk: [u8; 32],
    pub pseudonym: [u8; 32],
    pub published_at: u64,
    pub expires_at: u64,
}

impl PreKeyBundle {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Serialize, Deserialize)]
struct PublishPayload {
    bundle: PreKeyBundle,
}

#[derive(Serialize, Deserialize)]
struct QueryPayload {
    owner_pk: [u8; 32],
    requester_addr: Addr,
}

#[derive(Serialize, Deserialize)]
struct ResponsePayload {
    owner_pk: [u8; 32],
    bundle: Option<PreKeyBundle>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AsyncError::Malformed(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| AsyncError::Malformed(e.to_string()))
}

/// A per-query handler key: the owner whose bundle is wanted plus a
/// per-call suffix, mirroring `tox-group::registry::ResponseHandlerKey`
/// so concurrent queries for the same owner don't collide.
type ResponseKey = ([u8; 32], u64);

/// Registry of per-query directory-response waiters (§4.5, mirroring
/// `tox-group::registry::ResponseHandlerRegistry`).
#[derive(Default)]
pub struct PreKeyResponseRegistry {
    waiters: RwLock<HashMap<ResponseKey, oneshot::Sender<Option<PreKeyBundle>>>>,
    next_suffix: AtomicU64,
}

impl PreKeyResponseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, owner_pk: [u8; 32]) -> (ResponseKey, oneshot::Receiver<Option<PreKeyBundle>>) {
        let suffix = self.next_suffix.fetch_add(1, Ordering::SeqCst);
        let key = (owner_pk, suffix);
        let (tx, rx) = oneshot::channel();
        self.waiters.write().expect("waiters lock").insert(key, tx);
        (key, rx)
    }

    fn deregister(&self, key: ResponseKey) {
        self.waiters.write().expect("waiters lock").remove(&key);
    }

    pub fn len(&self) -> usize {
        self.waiters.read().expect("waiters lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dispatch(&self, owner_pk: [u8; 32], bundle: Option<PreKeyBundle>) {
        let matching: Vec<ResponseKey> = {
            let waiters = self.waiters.read().expect("waiters lock");
            waiters.keys().filter(|(pk, _)| *pk == owner_pk).copied().collect()
        };
        for key in matching {
            if let Some(tx) = self.waiters.write().expect("waiters lock").remove(&key) {
                let _ = tx.send(bundle.clone());
            }
        }
    }
}

/// A single-process pre-key directory: a flat map of owner public key to
/// that owner's still-unconsumed bundles, served to any requester who
/// queries for them.
pub struct InMemoryPreKeyDirectory {
    bundles: RwLock<HashMap<[u8; 32], VecDeque<PreKeyBundle>>>,
    time: Arc<dyn TimeProvider>,
}

impl InMemoryPreKeyDirectory {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            bundles: RwLock::new(HashMap::new()),
            time,
        }
    }

    /// Add a bundle to the directory (§4.5 "published in advance").
    pub fn publish(&self, bundle: PreKeyBundle) {
        self.bundles
            .write()
            .expect("bundles lock")
            .entry(bundle.owner_pk)
            .or_default()
            .push_back(bundle);
    }

    /// Pop the oldest unexpired bundle for `owner_pk`, consuming it.
    /// Expired bundles encountered along the way are discarded, never
    /// handed out.
    pub fn take(&self, owner_pk: [u8; 32]) -> Option<PreKeyBundle> {
        let now = self.time.now_ms() / 1000;
        let mut bundles = self.bundles.write().expect("bundles lock");
        let queue = bundles.get_mut(&owner_pk)?;
        while let Some(bundle) = queue.pop_front() {
            if !bundle.is_expired(now) {
                return Some(bundle);
            }
        }
        None
    }

    /// Number of still-unconsumed, possibly-expired bundles held for
    /// `owner_pk` (diagnostic/test use).
    pub fn remaining(&self, owner_pk: [u8; 32]) -> usize {
        self.bundles
            .read()
            .expect("bundles lock")
            .get(&owner_pk)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// A [`Handler`] for the `AsyncPreKeyPublish` tag.
    pub fn publish_handler(self: Arc<Self>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let directory = self.clone();
            async move {
                let payload: PublishPayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                directory.publish(payload.bundle);
                Ok(())
            }
        })
    }

    /// A [`Handler`] for the `AsyncPreKeyQuery` tag.
    pub fn query_handler(self: Arc<Self>, transport: Arc<dyn Transport>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let directory = self.clone();
            let transport = transport.clone();
            async move {
                let payload: QueryPayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                let bundle = directory.take(payload.owner_pk);
                let response = encode(&ResponsePayload {
                    owner_pk: payload.owner_pk,
                    bundle,
                })
                .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                transport
                    .send(Packet::new(packet::ASYNC_PREKEY_RESPONSE, response), &payload.requester_addr)
                    .await
            }
        })
    }

    /// A [`Handler`] for the `AsyncPreKeyResponse` tag: wakes whichever
    /// registered waiter matches the bundle's owner.
    pub fn response_handler(registry: Arc<PreKeyResponseRegistry>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let registry = registry.clone();
            async move {
                let payload: ResponsePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                registry.dispatch(payload.owner_pk, payload.bundle);
                Ok(())
            }
        })
    }
}

/// Publish `bundle` to the directory reachable at `directory_addr`.
pub async fn publish(transport: &dyn Transport, directory_addr: &Addr, bundle: PreKeyBundle) -> Result<()> {
    let payload = encode(&PublishPayload { bundle })?;
    transport
        .send(Packet::new(packet::ASYNC_PREKEY_PUBLISH, payload), directory_addr)
        .await
        .map_err(AsyncError::from)
}

/// Query the directory at `directory_addr` for one of `owner_pk`'s
/// pre-key bundles, waiting up to `timeout` for the response (§4.5,
/// mirroring `tox-group`'s DHT query timeout). `Ok(None)` distinguishes
/// "the directory answered, but has nothing left" from
/// [`AsyncError::Timeout`] ("the directory never answered at all").
pub async fn query(
    transport: &dyn Transport,
    directory_addr: &Addr,
    registry: &PreKeyResponseRegistry,
    owner_pk: [u8; 32],
    timeout: Duration,
) -> Result<Option<PreKeyBundle>> {
    let (key, rx) = registry.register(owner_pk);
    let payload = encode(&QueryPayload {
        owner_pk,
        requester_addr: transport.local_addr(),
    })?;
    if let Err(e) = transport
        .send(Packet::new(packet::ASYNC_PREKEY_QUERY, payload), directory_addr)
        .await
    {
        registry.deregister(key);
        return Err(AsyncError::from(e));
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(bundle)) => Ok(bundle),
        Ok(Err(_)) => {
            registry.deregister(key);
            Ok(None)
        }
        Err(_) => {
            registry.deregister(key);
            Err(AsyncError::Timeout(format!("pre-key query for owner {}", hex::encode(owner_pk))))
        }
    }
}
