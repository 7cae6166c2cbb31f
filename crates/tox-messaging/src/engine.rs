//! `MessagingEngine`: per-message state machine, retry/backoff, and
//! delivery-state callbacks (§4.2).
//!
//! The manager lock (`messages`) guards the id → entry map; each entry's
//! own lock guards that message's state and retry counters. Lock
//! ordering is manager → message, never the reverse (§4.2 "Concurrency"),
//! and no callback is ever invoked while either lock is held (§9
//! "Callback hazards") — state is snapshotted, the lock released, then
//! the callback called inside a panic-recovery boundary.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use tox_transport::{packet, Packet, Transport};
use tox_types::friend::FriendId;
use tox_types::message::{Message, MessageId, MessageState, MessageType};
use tox_types::traits::{FriendAddressResolver, KeyProvider, MessageStore, TimeProvider};
use tox_types::MAX_PLAINTEXT_MESSAGE;

use crate::{MessagingError, Result};

/// Fired on every state transition of a single message, in transition
/// order (§5 "Ordering guarantees"). Must tolerate being invoked from a
/// worker context and must not be assumed non-panicking by its caller —
/// the engine wraps every invocation in a panic-recovery boundary.
pub type StateChangeCallback = Arc<dyn Fn(&Message, MessageState, MessageState) + Send + Sync>;

#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval_ms: 5_000,
        }
    }
}

struct MessageEntry {
    message: Message,
    callbacks: Vec<StateChangeCallback>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    messages: Vec<Message>,
    next_id: u64,
}

pub struct MessagingEngine {
    transport: Arc<dyn Transport>,
    address_resolver: Arc<dyn FriendAddressResolver>,
    time: Arc<dyn TimeProvider>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    store: Option<Arc<dyn MessageStore>>,
    config: RetryConfig,
    messages: Mutex<HashMap<MessageId, Arc<Mutex<MessageEntry>>>>,
    next_id: AtomicU64,
    cancellation: CancellationToken,
    workers: AsyncMutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl MessagingEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        address_resolver: Arc<dyn FriendAddressResolver>,
        time: Arc<dyn TimeProvider>,
        key_provider: Option<Arc<dyn KeyProvider>>,
        store: Option<Arc<dyn MessageStore>>,
        config: RetryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            address_resolver,
            time,
            key_provider,
            store,
            config,
            messages: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            cancellation: CancellationToken::new(),
            workers: AsyncMutex::new(Vec::new()),
        })
    }

    /// Restore a previously persisted snapshot, if a [`MessageStore`] is
    /// configured and has one (§4.2 "Optional persistence"). Messages
    /// left `Pending`/`Sending`, or `Failed` with retries remaining, are
    /// reset to `Pending` and re-enter the retry queue.
    pub fn load(&self) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let Some(bytes) = store.load()? else { return Ok(()) };
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| MessagingError::Storage(e.to_string()))?;

        let mut messages = self.messages.lock().expect("messages lock");
        for mut message in snapshot.messages {
            let resumable = matches!(message.state, MessageState::Pending | MessageState::Sending)
                || (message.state == MessageState::Failed && message.retry_count < self.config.max_retries);
            if resumable {
                message.state = MessageState::Pending;
                message.last_attempt = None;
            }
            messages.insert(
                message.id,
                Arc::new(Mutex::new(MessageEntry {
                    message,
                    callbacks: Vec::new(),
                })),
            );
        }
        self.next_id.store(snapshot.next_id.max(1), Ordering::SeqCst);
        Ok(())
    }

    fn persist(&self) {
        let Some(store) = &self.store else { return };
        let snapshot = {
            let messages = self.messages.lock().expect("messages lock");
            Snapshot {
                messages: messages
                    .values()
                    .map(|e| e.lock().expect("entry lock").message.clone())
                    .collect(),
                next_id: self.next_id.load(Ordering::SeqCst),
            }
        };
        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = store.save(&bytes) {
                    tracing::warn!(error = %e, "failed to persist messaging engine snapshot");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize messaging engine snapshot"),
        }
    }

    /// Validate and enqueue `text` for `friend_id`, launching a worker
    /// task to attempt the first delivery (§4.2 "Concurrency"). Returns
    /// the message immediately; the caller observes further progress via
    /// [`Self::get`] or a registered [`StateChangeCallback`].
    pub async fn send(self: &Arc<Self>, friend_id: FriendId, text: impl Into<String>, msg_type: MessageType) -> Result<Message> {
        let text = text.into();
        if text.is_empty() {
            return Err(MessagingError::Validation("message text is empty".into()));
        }
        if text.len() > MAX_PLAINTEXT_MESSAGE {
            return Err(MessagingError::Validation(format!(
                "message exceeds {MAX_PLAINTEXT_MESSAGE} bytes"
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = self.time.now_ms();
        let message = Message::new(id, friend_id, msg_type, text, now);

        self.messages.lock().expect("messages lock").insert(
            id,
            Arc::new(Mutex::new(MessageEntry {
                message: message.clone(),
                callbacks: Vec::new(),
            })),
        );
        self.persist();

        let engine = self.clone();
        let cancellation = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => engine.cancel_in_flight(id),
                _ = engine.attempt_send(id) => {}
            }
        });
        self.workers.lock().await.push(handle);

        Ok(message)
    }

    /// One tick of the retry driver (§4.2, §5): attempts every `Pending`
    /// message whose backoff window has elapsed. Safe to call
    /// periodically from a caller-owned cadence.
    pub async fn process_pending(self: &Arc<Self>) {
        let now_due: Vec<MessageId> = {
            let messages = self.messages.lock().expect("messages lock");
            messages
                .values()
                .filter_map(|entry| {
                    let e = entry.lock().expect("entry lock");
                    let due = e.message.state == MessageState::Pending
                        && e.message
                            .last_attempt
                            .map(|last| self.time.since_ms(last) >= self.config.retry_interval_ms)
                            .unwrap_or(true);
                    due.then_some(e.message.id)
                })
                .collect()
        };

        for id in now_due {
            if self.cancellation.is_cancelled() {
                break;
            }
            self.attempt_send(id).await;
        }
    }

    async fn attempt_send(self: &Arc<Self>, id: MessageId) {
        let Some(entry) = self.entry(id) else { return };

        let (friend_id, msg_type, text, from_state) = {
            let mut e = entry.lock().expect("entry lock");
            if e.message.state != MessageState::Pending {
                return;
            }
            let from = e.message.state;
            e.message.state = MessageState::Sending;
            e.message.last_attempt = Some(self.time.now_ms());
            (e.message.friend_id, e.message.msg_type, e.message.text.clone(), from)
        };
        self.notify(&entry, from_state, MessageState::Sending);

        match self.dispatch(friend_id, msg_type, &text).await {
            Ok(()) => {
                self.transition(&entry, MessageState::Sent);
                self.persist();
            }
            Err(err) => {
                tracing::warn!(message_id = id, friend_id, error = %err, "friend message send failed");
                let next_state = {
                    let mut e = entry.lock().expect("entry lock");
                    e.message.retry_count += 1;
                    e.message.state = if e.message.retry_count >= self.config.max_retries {
                        MessageState::Failed
                    } else {
                        MessageState::Pending
                    };
                    e.message.state
                };
                self.notify(&entry, MessageState::Sending, next_state);
                if next_state == MessageState::Failed {
                    tracing::warn!(message_id = id, friend_id, "message retries exhausted");
                }
                self.persist();
            }
        }
    }

    async fn dispatch(&self, friend_id: FriendId, msg_type: MessageType, text: &str) -> Result<()> {
        let addr = self.address_resolver.resolve(friend_id)?;

        let message_text = match &self.key_provider {
            Some(kp) => {
                let peer_pk = kp.get_friend_public_key(friend_id)?;
                let self_sk = kp.get_self_private_key()?;
                crate::crypto::encrypt_message(text.as_bytes(), peer_pk, self_sk)?
            }
            None => {
                tracing::warn!(friend_id, msg_type = ?msg_type, "sending friend message without encryption configured");
                text.to_string()
            }
        };

        let mut bytes = Vec::with_capacity(4 + 1 + message_text.len());
        bytes.extend_from_slice(&friend_id.to_be_bytes());
        bytes.push(match msg_type {
            MessageType::Normal => 0,
            MessageType::Action => 1,
        });
        bytes.extend_from_slice(message_text.as_bytes());

        self.transport.send(Packet::new(packet::FRIEND_MESSAGE, bytes), &addr).await?;
        Ok(())
    }

    /// `Sent → Delivered`, driven by an inbound peer delivery receipt.
    pub fn mark_delivered(&self, id: MessageId) -> Result<()> {
        self.require_transition(id, MessageState::Sent, MessageState::Delivered)
    }

    /// `Delivered → Read`, driven by an inbound peer read receipt.
    pub fn mark_read(&self, id: MessageId) -> Result<()> {
        self.require_transition(id, MessageState::Delivered, MessageState::Read)
    }

    fn require_transition(&self, id: MessageId, expected: MessageState, to: MessageState) -> Result<()> {
        let entry = self.entry(id).ok_or(MessagingError::NotFound(id))?;
        {
            let e = entry.lock().expect("entry lock");
            if e.message.state != expected {
                return Err(MessagingError::Validation(format!(
                    "message {id} must be {expected:?} to transition to {to:?}, currently {:?}",
                    e.message.state
                )));
            }
        }
        self.transition(&entry, to);
        self.persist();
        Ok(())
    }

    pub fn get(&self, id: MessageId) -> Option<Message> {
        self.entry(id).map(|e| e.lock().expect("entry lock").message.clone())
    }

    pub fn list_by_friend(&self, friend_id: FriendId) -> Vec<Message> {
        self.messages
            .lock()
            .expect("messages lock")
            .values()
            .filter_map(|entry| {
                let e = entry.lock().expect("entry lock");
                (e.message.friend_id == friend_id).then(|| e.message.clone())
            })
            .collect()
    }

    /// Register a callback fired on every subsequent state transition of
    /// `id`. Fails if the message is unknown.
    pub fn on_delivery_state_change(&self, id: MessageId, callback: StateChangeCallback) -> Result<()> {
        let entry = self.entry(id).ok_or(MessagingError::NotFound(id))?;
        entry.lock().expect("entry lock").callbacks.push(callback);
        Ok(())
    }

    /// Cancel outstanding work and block until every in-flight send has
    /// resolved (§4.2, §5). In-flight workers observe the cancellation at
    /// their next suspension and mark the message `Pending` rather than
    /// losing it.
    pub async fn close(&self) {
        self.cancellation.cancel();
        self.flush().await;
    }

    /// Wait for every currently spawned send worker to finish, without
    /// cancelling anything. A synchronization point for callers (and
    /// tests) that just sent a message and want its first attempt to
    /// have run before inspecting state.
    pub async fn flush(&self) {
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn entry(&self, id: MessageId) -> Option<Arc<Mutex<MessageEntry>>> {
        self.messages.lock().expect("messages lock").get(&id).cloned()
    }

    fn cancel_in_flight(&self, id: MessageId) {
        if let Some(entry) = self.entry(id) {
            let mut e = entry.lock().expect("entry lock");
            if e.message.state == MessageState::Sending {
                e.message.state = MessageState::Pending;
            }
        }
    }

    fn transition(&self, entry: &Arc<Mutex<MessageEntry>>, to: MessageState) {
        let from = {
            let mut e = entry.lock().expect("entry lock");
            let from = e.message.state;
            e.message.state = to;
            from
        };
        self.notify(entry, from, to);
    }

    fn notify(&self, entry: &Arc<Mutex<MessageEntry>>, from: MessageState, to: MessageState) {
        if from == to {
            return;
        }
        let (message, callbacks) = {
            let e = entry.lock().expect("entry lock");
            (e.message.clone(), e.callbacks.clone())
        };
        for cb in callbacks {
            if catch_unwind(AssertUnwindSafe(|| cb(&message, from, to))).is_err() {
                tracing::error!(message_id = message.id, "delivery-state callback panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64 as StdAtomicU64, AtomicUsize, Ordering as StdOrdering};
    use tox_transport::memory::{MemoryNetwork, MemoryTransport};

    struct MockTime(StdAtomicU64);
    impl TimeProvider for MockTime {
        fn now_ms(&self) -> u64 {
            self.0.load(StdOrdering::SeqCst)
        }
    }
    impl MockTime {
        fn advance(&self, ms: u64) {
            self.0.fetch_add(ms, StdOrdering::SeqCst);
        }
    }

    struct StaticResolver(String);
    impl FriendAddressResolver for StaticResolver {
        fn resolve(&self, _friend_id: FriendId) -> tox_types::error::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn engine(transport: Arc<dyn Transport>, time: Arc<MockTime>) -> Arc<MessagingEngine> {
        MessagingEngine::new(
            transport,
            Arc::new(StaticResolver("bob".to_string())),
            time,
            None,
            None,
            RetryConfig {
                max_retries: 3,
                retry_interval_ms: 5_000,
            },
        )
    }

    #[tokio::test]
    async fn send_rejects_empty_message() {
        let net = MemoryNetwork::new();
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net, "alice".to_string()));
        let time = Arc::new(MockTime(StdAtomicU64::new(0)));
        let eng = engine(transport, time);

        assert!(eng.send(1, "", MessageType::Normal).await.is_err());
    }

    #[tokio::test]
    async fn send_accepts_exactly_max_plaintext_and_rejects_one_more() {
        let net = MemoryNetwork::new();
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net, "alice".to_string()));
        let time = Arc::new(MockTime(StdAtomicU64::new(0)));
        let eng = engine(transport, time);

        let max_text = "a".repeat(MAX_PLAINTEXT_MESSAGE);
        assert!(eng.send(1, max_text, MessageType::Normal).await.is_ok());

        let over_text = "a".repeat(MAX_PLAINTEXT_MESSAGE + 1);
        assert!(eng.send(1, over_text, MessageType::Normal).await.is_err());
    }

    #[tokio::test]
    async fn mark_delivered_requires_sent_state() {
        let net = MemoryNetwork::new();
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net, "alice".to_string()));
        let time = Arc::new(MockTime(StdAtomicU64::new(0)));
        let eng = engine(transport, time);

        let message = eng.send(1, "hi", MessageType::Normal).await.expect("send");
        assert!(eng.mark_delivered(message.id).is_err());
    }

    #[tokio::test]
    async fn retry_then_success_matches_seed_scenario() {
        let net = MemoryNetwork::new();
        let alice: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "alice".to_string()));
        let _bob = MemoryTransport::new(net.clone(), "bob".to_string());
        net.fail("bob".to_string());

        let time = Arc::new(MockTime(StdAtomicU64::new(0)));
        let eng = engine(alice, time.clone());

        let message = eng.send(1, "ping", MessageType::Normal).await.expect("send");
        eng.flush().await; // wait for the first (failing) attempt to resolve

        let after_first = eng.get(message.id).expect("get");
        assert_eq!(after_first.state, MessageState::Pending);
        assert_eq!(after_first.retry_count, 1);

        // Not yet due: backoff window has not elapsed.
        eng.process_pending().await;
        assert_eq!(eng.get(message.id).unwrap().state, MessageState::Pending);
        assert_eq!(eng.get(message.id).unwrap().retry_count, 1);

        net.clear_failure(&"bob".to_string());
        time.advance(5_000);
        eng.process_pending().await;

        let after_second = eng.get(message.id).expect("get");
        assert_eq!(after_second.state, MessageState::Sent);
        assert_eq!(after_second.retry_count, 1);
    }

    #[tokio::test]
    async fn state_change_callbacks_fire_in_order() {
        let net = MemoryNetwork::new();
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net, "alice".to_string()));
        let time = Arc::new(MockTime(StdAtomicU64::new(0)));
        let eng = engine(transport, time);

        let message = eng.send(1, "hi", MessageType::Normal).await.expect("send");
        let transitions = Arc::new(std::sync::Mutex::new(Vec::new()));
        let transitions2 = transitions.clone();
        eng.on_delivery_state_change(
            message.id,
            Arc::new(move |_msg, from, to| {
                transitions2.lock().unwrap().push((from, to));
            }),
        )
        .expect("register callback");

        eng.flush().await;

        let seen = transitions.lock().unwrap().clone();
        assert_eq!(seen, vec![(MessageState::Sending, MessageState::Sent)]);
    }

    #[tokio::test]
    async fn panicking_callback_does_not_break_the_engine() {
        let net = MemoryNetwork::new();
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net, "alice".to_string()));
        let time = Arc::new(MockTime(StdAtomicU64::new(0)));
        let eng = engine(transport, time);

        let message = eng.send(1, "hi", MessageType::Normal).await.expect("send");
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        eng.on_delivery_state_change(
            message.id,
            Arc::new(move |_msg, _from, _to| {
                calls2.fetch_add(1, StdOrdering::SeqCst);
                panic!("callback exploded");
            }),
        )
        .expect("register callback");

        eng.flush().await;
        assert!(calls.load(StdOrdering::SeqCst) >= 1);
        assert_eq!(eng.get(message.id).unwrap().state, MessageState::Sent);
    }

    #[tokio::test]
    async fn persistence_round_trip_restores_pending_messages() {
        use tox_types::traits::MessageStore;

        struct MemStore(std::sync::Mutex<Option<Vec<u8>>>);
        impl MessageStore for MemStore {
            fn save(&self, bytes: &[u8]) -> tox_types::error::Result<()> {
                *self.0.lock().unwrap() = Some(bytes.to_vec());
                Ok(())
            }
            fn load(&self) -> tox_types::error::Result<Option<Vec<u8>>> {
                Ok(self.0.lock().unwrap().clone())
            }
        }

        let store = Arc::new(MemStore(std::sync::Mutex::new(None)));
        let net = MemoryNetwork::new();
        let alice: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net.clone(), "alice".to_string()));
        net.fail("bob".to_string());
        let time = Arc::new(MockTime(StdAtomicU64::new(0)));

        let eng = MessagingEngine::new(
            alice,
            Arc::new(StaticResolver("bob".to_string())),
            time,
            None,
            Some(store.clone() as Arc<dyn MessageStore>),
            RetryConfig::default(),
        );

        let message = eng.send(1, "offline draft", MessageType::Normal).await.expect("send");
        eng.flush().await;
        assert_eq!(eng.get(message.id).unwrap().state, MessageState::Pending);

        let net2 = MemoryNetwork::new();
        let alice2: Arc<dyn Transport> = Arc::new(MemoryTransport::new(net2.clone(), "alice".to_string()));
        let _bob2 = MemoryTransport::new(net2, "bob".to_string());
        let time2 = Arc::new(MockTime(StdAtomicU64::new(0)));
        let restored = MessagingEngine::new(
            alice2,
            Arc::new(StaticResolver("bob".to_string())),
            time2,
            None,
            Some(store as Arc<dyn MessageStore>),
            RetryConfig::default(),
        );
        restored.load().expect("load");

        assert_eq!(restored.get(message.id).unwrap().state, MessageState::Pending);
        restored.process_pending().await;
        assert_eq!(restored.get(message.id).unwrap().state, MessageState::Sent);
    }
}
