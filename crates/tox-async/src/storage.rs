//! The pseudonymous store-and-forward collaborator (§4.5 "Storage node
//! contract"): holds ciphertext the storage node can never attribute to a
//! real identity, keyed only by the per-epoch pseudonym its owner derives
//! locally and hands to the node.
//!
//! [`InMemoryStorageNode`] is the same local-concrete-plus-transport-
//! handlers shape as `tox-dht`'s `InMemoryDht` and [`crate::prekey`]'s
//! `InMemoryPreKeyDirectory`: one struct that is both the thing a node
//! operator runs and the thing a client talks to over the wire. Because
//! store/retrieve/delete are point-to-point request/response calls
//! rather than fan-out broadcasts, waiters are correlated by a numeric
//! call id instead of a semantic key (a recipient pseudonym can have
//! several concurrent calls in flight; a group id or owner key, per
//! `tox-group`/`tox-async::prekey`'s registries, cannot disambiguate
//! those).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tox_transport::{packet, BoxFuture, Handler, Packet, Transport};
use tox_types::async_message::{Pseudonym, StorageMessageId, StorageStats, StoredMessage};
use tox_types::traits::{Addr, TimeProvider};

use crate::{AsyncError, Result};

/// A oneshot waiter registry correlated by an opaque call id, shared by
/// the store/retrieve/delete client-side calls.
struct CorrelationRegistry<T> {
    waiters: RwLock<HashMap<u64, oneshot::Sender<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for CorrelationRegistry<T> {
    fn default() -> Self {
        Self {
            waiters: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> CorrelationRegistry<T> {
    fn new() -> Self {
        Self::default()
    }

    fn register(&self) -> (u64, oneshot::Receiver<T>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiters.write().expect("waiters lock").insert(id, tx);
        (id, rx)
    }

    fn deregister(&self, id: u64) {
        self.waiters.write().expect("waiters lock").remove(&id);
    }

    fn dispatch(&self, id: u64, value: T) {
        if let Some(tx) = self.waiters.write().expect("waiters lock").remove(&id) {
            let _ = tx.send(value);
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StorePayload {
    call_id: u64,
    requester_addr: Addr,
    message: StoredMessage,
}

#[derive(Serialize, Deserialize)]
struct StoreResponsePayload {
    call_id: u64,
    result: std::result::Result<StorageMessageId, String>,
}

#[derive(Serialize, Deserialize)]
struct RetrievePayload {
    call_id: u64,
    requester_addr: Addr,
    pseudonym: Pseudonym,
}

#[derive(Serialize, Deserialize)]
struct RetrieveResponsePayload {
    call_id: u64,
    messages: Vec<StoredMessage>,
}

#[derive(Serialize, Deserialize)]
struct DeletePayload {
    call_id: u64,
    requester_addr: Addr,
    pseudonym: Pseudonym,
    id: StorageMessageId,
}

#[derive(Serialize, Deserialize)]
struct DeleteResponsePayload {
    call_id: u64,
    result: std::result::Result<(), String>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AsyncError::Malformed(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| AsyncError::Malformed(e.to_string()))
}

fn fresh_message_id() -> StorageMessageId {
    let mut id = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut id);
    id
}

/// A single-process storage node: a flat map of recipient pseudonym to
/// that pseudonym's still-live stored messages.
pub struct InMemoryStorageNode {
    messages: RwLock<HashMap<Pseudonym, Vec<StoredMessage>>>,
    time: Arc<dyn TimeProvider>,
    capacity_per_recipient: usize,
}

impl InMemoryStorageNode {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self::with_capacity(time, crate::STORAGE_CAPACITY_PER_RECIPIENT)
    }

    pub fn with_capacity(time: Arc<dyn TimeProvider>, capacity_per_recipient: usize) -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
            time,
            capacity_per_recipient,
        }
    }

    fn now_secs(&self) -> u64 {
        self.time.now_ms() / 1000
    }

    /// Store a message, assigning it a fresh id. Rejects a ciphertext
    /// larger than [`tox_types::MAX_STORAGE_MESSAGE`] with
    /// [`AsyncError::Validation`] (§4.5 "MaxStorageMessage"), and fails
    /// with [`AsyncError::Exhausted`] once the recipient's bucket is at
    /// capacity (§4.5 "enforces per-recipient capacity"), after first
    /// reclaiming any space occupied by expired entries.
    pub fn store(&self, mut message: StoredMessage) -> Result<StorageMessageId> {
        if message.ciphertext.len() > tox_types::MAX_STORAGE_MESSAGE {
            return Err(AsyncError::Validation(format!(
                "stored message of {} bytes exceeds MaxStorageMessage ({} bytes)",
                message.ciphertext.len(),
                tox_types::MAX_STORAGE_MESSAGE
            )));
        }

        let now = self.now_secs();
        let id = fresh_message_id();
        message.id = id;

        let mut messages = self.messages.write().expect("messages lock");
        let bucket = messages.entry(message.recipient_pseudonym).or_default();
        bucket.retain(|m| !m.is_expired(now));

        if bucket.len() >= self.capacity_per_recipient {
            return Err(AsyncError::Exhausted);
        }
        bucket.push(message);
        Ok(id)
    }

    /// All currently-live messages addressed to `pseudonym`.
    pub fn retrieve(&self, pseudonym: Pseudonym) -> Vec<StoredMessage> {
        let now = self.now_secs();
        self.messages
            .read()
            .expect("messages lock")
            .get(&pseudonym)
            .map(|bucket| bucket.iter().filter(|m| !m.is_expired(now)).cloned().collect())
            .unwrap_or_default()
    }

    /// Remove one message by id, once the recipient has acknowledged it
    /// (§8 scenario 6: "after `delete(id)` the store reports one fewer
    /// total message").
    pub fn delete(&self, pseudonym: Pseudonym, id: StorageMessageId) -> Result<()> {
        let mut messages = self.messages.write().expect("messages lock");
        let Some(bucket) = messages.get_mut(&pseudonym) else {
            return Err(AsyncError::NotFound("no messages for this pseudonym".into()));
        };
        let before = bucket.len();
        bucket.retain(|m| m.id != id);
        if bucket.len() == before {
            return Err(AsyncError::NotFound("no message with that id".into()));
        }
        Ok(())
    }

    /// Drop every expired message across every recipient; returns the
    /// number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.now_secs();
        let mut removed = 0usize;
        let mut messages = self.messages.write().expect("messages lock");
        for bucket in messages.values_mut() {
            let before = bucket.len();
            bucket.retain(|m| !m.is_expired(now));
            removed += before - bucket.len();
        }
        messages.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    pub fn stats(&self) -> StorageStats {
        let messages = self.messages.read().expect("messages lock");
        let total: u64 = messages.values().map(|b| b.len() as u64).sum();
        let unique_recipients = messages.len() as u64;
        let capacity = self.capacity_per_recipient as u64;
        let slots = capacity.saturating_mul(unique_recipients.max(1));
        let utilization_pct = if slots == 0 { 0.0 } else { (total as f64 / slots as f64) * 100.0 };
        StorageStats {
            total,
            unique_recipients,
            capacity,
            utilization_pct,
        }
    }

    pub fn store_handler(self: Arc<Self>, transport: Arc<dyn Transport>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let node = self.clone();
            let transport = transport.clone();
            async move {
                let payload: StorePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                let result = node.store(payload.message).map_err(|e| e.to_string());
                let response = encode(&StoreResponsePayload {
                    call_id: payload.call_id,
                    result,
                })
                .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                transport
                    .send(Packet::new(packet::ASYNC_STORE_RESPONSE, response), &payload.requester_addr)
                    .await
            }
        })
    }

    pub fn retrieve_handler(self: Arc<Self>, transport: Arc<dyn Transport>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let node = self.clone();
            let transport = transport.clone();
            async move {
                let payload: RetrievePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                let messages = node.retrieve(payload.pseudonym);
                let response = encode(&RetrieveResponsePayload {
                    call_id: payload.call_id,
                    messages,
                })
                .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                transport
                    .send(Packet::new(packet::ASYNC_RETRIEVE_RESPONSE, response), &payload.requester_addr)
                    .await
            }
        })
    }

    pub fn delete_handler(self: Arc<Self>, transport: Arc<dyn Transport>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let node = self.clone();
            let transport = transport.clone();
            async move {
                let payload: DeletePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                let result = node.delete(payload.pseudonym, payload.id).map_err(|e| e.to_string());
                let response = encode(&DeleteResponsePayload {
                    call_id: payload.call_id,
                    result,
                })
                .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                transport
                    .send(Packet::new(packet::ASYNC_DELETE_RESPONSE, response), &payload.requester_addr)
                    .await
            }
        })
    }
}

/// Per-process waiter registries for the three storage RPCs, owned by
/// whichever client issues store/retrieve/delete calls.
#[derive(Default)]
pub struct StorageClientState {
    store_waiters: CorrelationRegistry<std::result::Result<StorageMessageId, String>>,
    retrieve_waiters: CorrelationRegistry<Vec<StoredMessage>>,
    delete_waiters: CorrelationRegistry<std::result::Result<(), String>>,
}

impl StorageClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_response_handler(state: Arc<Self>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let state = state.clone();
            async move {
                let payload: StoreResponsePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                state.store_waiters.dispatch(payload.call_id, payload.result);
                Ok(())
            }
        })
    }

    pub fn retrieve_response_handler(state: Arc<Self>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let state = state.clone();
            async move {
                let payload: RetrieveResponsePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                state.retrieve_waiters.dispatch(payload.call_id, payload.messages);
                Ok(())
            }
        })
    }

    pub fn delete_response_handler(state: Arc<Self>) -> Handler {
        tox_transport::memory::handler(move |packet, _from| {
            let state = state.clone();
            async move {
                let payload: DeleteResponsePayload = decode(&packet.bytes)
                    .map_err(|e| tox_transport::TransportError::HandlerRejected(e.to_string()))?;
                state.delete_waiters.dispatch(payload.call_id, payload.result);
                Ok(())
            }
        })
    }
}

/// Store `message` at the node reachable at `node_addr`, waiting up to
/// `timeout` for its acknowledgement.
pub async fn store_remote(
    transport: &dyn Transport,
    node_addr: &Addr,
    state: &StorageClientState,
    message: StoredMessage,
    timeout: Duration,
) -> Result<StorageMessageId> {
    let (call_id, rx) = state.store_waiters.register();
    let payload = encode(&StorePayload {
        call_id,
        requester_addr: transport.local_addr(),
        message,
    })?;
    if let Err(e) = transport.send(Packet::new(packet::ASYNC_STORE, payload), node_addr).await {
        state.store_waiters.deregister(call_id);
        return Err(AsyncError::from(e));
    }
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok(id))) => Ok(id),
        Ok(Ok(Err(e))) => Err(AsyncError::Validation(e)),
        Ok(Err(_)) => {
            state.store_waiters.deregister(call_id);
            Err(AsyncError::Malformed("storage node closed the response channel".into()))
        }
        Err(_) => {
            state.store_waiters.deregister(call_id);
            Err(AsyncError::Timeout(format!("store at {node_addr}")))
        }
    }
}

/// Retrieve every live message addressed to `pseudonym` from the node at
/// `node_addr`.
pub async fn retrieve_remote(
    transport: &dyn Transport,
    node_addr: &Addr,
    state: &StorageClientState,
    pseudonym: Pseudonym,
    timeout: Duration,
) -> Result<Vec<StoredMessage>> {
    let (call_id, rx) = state.retrieve_waiters.register();
    let payload = encode(&RetrievePayload {
        call_id,
        requester_addr: transport.local_addr(),
        pseudonym,
    })?;
    if let Err(e) = transport.send(Packet::new(packet::ASYNC_RETRIEVE, payload), node_addr).await {
        state.retrieve_waiters.deregister(call_id);
        return Err(AsyncError::from(e));
    }
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(messages)) => Ok(messages),
        Ok(Err(_)) => {
            state.retrieve_waiters.deregister(call_id);
            Ok(Vec::new())
        }
        Err(_) => {
            state.retrieve_waiters.deregister(call_id);
            Err(AsyncError::Timeout(format!("retrieve from {node_addr}")))
        }
    }
}

/// Delete message `id` addressed to `pseudonym` from the node at
/// `node_addr`.
pub async fn delete_remote(
    transport: &dyn Transport,
    node_addr: &Addr,
    state: &StorageClientState,
    pseudonym: Pseudonym,
    id: StorageMessageId,
    timeout: Duration,
) -> Result<()> {
    let (call_id, rx) = state.delete_waiters.register();
    let payload = encode(&DeletePayload {
        call_id,
        requester_addr: transport.local_addr(),
        pseudonym,
        id,
    })?;
    if let Err(e) = transport.send(Packet::new(packet::ASYNC_DELETE, payload), node_addr).await {
        state.delete_waiters.deregister(call_id);
        return Err(AsyncError::from(e));
    }
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(AsyncError::NotFound(e)),
        Ok(Err(_)) => {
            state.delete_waiters.deregister(call_id);
            Err(AsyncError::Malformed("storage node closed the response channel".into()))
        }
        Err(_) => {
            state.delete_waiters.deregister(call_id);
            Err(AsyncError::Timeout(format!("delete at {node_addr}")))
        }
    }
}
