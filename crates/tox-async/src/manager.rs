//! `AsyncManager`: the client-facing contract for async (offline)
//! messaging (§4.5) — `send`, `retrieve_messages`, `acknowledge`, and
//! `publish_prekeys`. Composes [`crate::wire`], [`crate::prekey`], and
//! [`crate::storage`] the way `tox_messaging::engine::MessagingEngine`
//! composes crypto, padding, and transport: a single owning struct built
//! against the collaborator traits (`KeyProvider`, `TimeProvider`)
//! instead of globals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tox_crypto::pseudonym;
use tox_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use tox_transport::{packet, Transport};
use tox_types::async_message::{AsyncMessage, AsyncMessageType, Pseudonym, StorageMessageId, StoredMessage};
use tox_types::traits::{Addr, KeyProvider, TimeProvider};

use crate::prekey::{self, InMemoryPreKeyDirectory, PreKeyBundle, PreKeyResponseRegistry};
use crate::storage::{self, StorageClientState};
use crate::wire;
use crate::{AsyncError, Result, DEFAULT_MESSAGE_TTL_SECS, DEFAULT_PREKEY_QUERY_TIMEOUT_MS, EPOCH_DURATION_MS};

struct LocalPreKey {
    secret: X25519StaticSecret,
    expires_at: u64,
}

pub struct AsyncManager {
    self_sk: X25519StaticSecret,
    time: Arc<dyn TimeProvider>,
    transport: Arc<dyn Transport>,
    directory_addr: Addr,
    storage_addr: Addr,
    prekey_registry: Arc<PreKeyResponseRegistry>,
    storage_state: Arc<StorageClientState>,
    prekey_query_timeout: Duration,
    storage_query_timeout: Duration,
    padding_tiers: Vec<usize>,
    local_prekeys: Mutex<Vec<LocalPreKey>>,
    /// `(pseudonym, id)` for each entry of the most recent
    /// [`Self::retrieve_messages`] call, in the same order, so
    /// [`Self::acknowledge`] can delete by position without `AsyncMessage`
    /// itself needing to carry a message id.
    pending_acks: Mutex<Vec<(Pseudonym, StorageMessageId)>>,
    /// Per-peer online/offline status, set by the embedding runtime via
    /// [`Self::set_friend_online_status`] (§4.5 "controls whether sends
    /// route directly or via async storage"). Async messaging has no
    /// visibility into the friend layer's direct transport path, so
    /// `send` only consults this map to refuse store-and-forward delivery
    /// for a peer the caller has marked reachable; the caller is expected
    /// to route directly instead.
    online_status: Mutex<HashMap<[u8; 32], bool>>,
}

impl AsyncManager {
    /// Builds the manager and registers its response handlers
    /// (`AsyncPreKeyResponse`, `AsyncStoreResponse`, `AsyncRetrieveResponse`,
    /// `AsyncDeleteResponse`) on `transport`, mirroring
    /// `GroupManager::new`'s self-wiring of its DHT response callback.
    pub fn new(
        key_provider: &dyn KeyProvider,
        time: Arc<dyn TimeProvider>,
        transport: Arc<dyn Transport>,
        directory_addr: Addr,
        storage_addr: Addr,
    ) -> Result<Arc<Self>> {
        let self_sk = X25519StaticSecret::from_bytes(key_provider.get_self_private_key()?);
        let prekey_registry = Arc::new(PreKeyResponseRegistry::new());
        let storage_state = Arc::new(StorageClientState::new());

        transport.register_handler(packet::ASYNC_PREKEY_RESPONSE, InMemoryPreKeyDirectory::response_handler(prekey_registry.clone()));
        transport.register_handler(
            packet::ASYNC_STORE_RESPONSE,
            StorageClientState::store_response_handler(storage_state.clone()),
        );
        transport.register_handler(
            packet::ASYNC_RETRIEVE_RESPONSE,
            StorageClientState::retrieve_response_handler(storage_state.clone()),
        );
        transport.register_handler(
            packet::ASYNC_DELETE_RESPONSE,
            StorageClientState::delete_response_handler(storage_state.clone()),
        );

        Ok(Arc::new(Self {
            self_sk,
            time,
            transport,
            directory_addr,
            storage_addr,
            prekey_registry,
            storage_state,
            prekey_query_timeout: Duration::from_millis(DEFAULT_PREKEY_QUERY_TIMEOUT_MS),
            storage_query_timeout: Duration::from_millis(DEFAULT_PREKEY_QUERY_TIMEOUT_MS),
            padding_tiers: tox_types::STORAGE_PADDING_TIERS.to_vec(),
            local_prekeys: Mutex::new(Vec::new()),
            pending_acks: Mutex::new(Vec::new()),
            online_status: Mutex::new(HashMap::new()),
        }))
    }

    /// Record whether `pk` is currently reachable directly (§4.5 "controls
    /// whether sends route directly or via async storage"). A peer not
    /// present in the map is treated as offline, so [`Self::send`] routes
    /// via storage by default.
    pub fn set_friend_online_status(&self, pk: [u8; 32], online: bool) {
        self.online_status.lock().expect("online status lock").insert(pk, online);
    }

    fn is_online(&self, pk: &[u8; 32]) -> bool {
        self.online_status.lock().expect("online status lock").get(pk).copied().unwrap_or(false)
    }

    fn now_secs(&self) -> u64 {
        self.time.now_ms() / 1000
    }

    fn current_epoch(&self) -> u64 {
        self.time.now_ms() / EPOCH_DURATION_MS
    }

    fn self_pk(&self) -> [u8; 32] {
        self.self_sk.public_key().to_bytes()
    }

    /// Generate `count` fresh one-time pre-keys and publish their
    /// bundles to the directory (§4.5 "published in advance"). Each
    /// bundle advertises this process's *current-epoch* pseudonym, since
    /// that is what a sender will store a reply's pseudonym-keyed record
    /// under.
    pub async fn publish_prekeys(self: &Arc<Self>, count: usize, ttl_secs: u64) -> Result<()> {
        let epoch = self.current_epoch();
        let pseudonym = pseudonym::derive(&self.self_sk, epoch);
        let published_at = self.now_secs();
        let expires_at = published_at.saturating_add(ttl_secs);

        for _ in 0..count {
            let secret = X25519StaticSecret::random();
            let prekey_pk = secret.public_key().to_bytes();

            self.local_prekeys.lock().expect("local prekeys lock").push(LocalPreKey { secret, expires_at });

            let bundle = PreKeyBundle {
                owner_pk: self.self_pk(),
                prekey_pk,
                pseudonym,
                published_at,
                expires_at,
            };
            prekey::publish(self.transport.as_ref(), &self.directory_addr, bundle).await?;
        }
        self.prune_expired_local_prekeys();
        Ok(())
    }

    fn prune_expired_local_prekeys(&self) {
        let now = self.now_secs();
        self.local_prekeys.lock().expect("local prekeys lock").retain(|k| k.expires_at > now);
    }

    /// `send(recipient_pk, plaintext, type)` (§4.5): fetches one of the
    /// recipient's published pre-keys and seals the message against it.
    /// Fails with [`AsyncError::NoPreKeys`] when the directory has none
    /// left, surfaced distinctly so a caller can initiate a pre-key
    /// exchange instead of retrying blindly. Fails with
    /// [`AsyncError::FriendOnline`] when `recipient_pk` is marked online
    /// via [`Self::set_friend_online_status`], since a reachable peer
    /// should receive the message directly rather than via storage.
    pub async fn send(&self, recipient_pk: [u8; 32], plaintext: &[u8], msg_type: AsyncMessageType) -> Result<()> {
        if plaintext.is_empty() {
            return Err(AsyncError::Validation("plaintext is empty".into()));
        }
        if self.is_online(&recipient_pk) {
            return Err(AsyncError::FriendOnline);
        }

        let bundle = prekey::query(
            self.transport.as_ref(),
            &self.directory_addr,
            &self.prekey_registry,
            recipient_pk,
            self.prekey_query_timeout,
        )
        .await?
        .ok_or(AsyncError::NoPreKeys)?;

        if bundle.is_expired(self.now_secs()) {
            return Err(AsyncError::NoPreKeys);
        }

        let recipient_prekey_pk = X25519PublicKey::from_bytes(bundle.prekey_pk);
        let sealed = wire::seal(&self.self_sk, msg_type, plaintext, &recipient_prekey_pk, &self.padding_tiers)?;

        let stored = StoredMessage {
            id: [0u8; 16],
            recipient_pseudonym: bundle.pseudonym,
            sender_pseudonym: pseudonym::derive(&self.self_sk, self.current_epoch()),
            // The handshake envelope self-describes its own nonce
            // (`ephemeral_pk || nonce || ciphertext`, see
            // `tox_crypto::handshake`), so the separate `nonce` field is
            // left zeroed for async messages rather than duplicated.
            ciphertext: sealed,
            nonce: [0u8; 24],
            msg_type,
            stored_at: self.now_secs(),
            ttl: DEFAULT_MESSAGE_TTL_SECS,
        };

        storage::store_remote(
            self.transport.as_ref(),
            &self.storage_addr,
            &self.storage_state,
            stored,
            self.storage_query_timeout,
        )
        .await?;
        Ok(())
    }

    /// Retrieve and decrypt every message currently waiting for us,
    /// checking both the current epoch's pseudonym and the immediately
    /// preceding one so a message stored just before an epoch boundary
    /// is not missed (§4.5, §9 "Pseudonym-derivation function").
    pub async fn retrieve_messages(&self) -> Result<Vec<AsyncMessage>> {
        self.prune_expired_local_prekeys();

        let current_epoch = self.current_epoch();
        let epochs: Vec<u64> = if current_epoch == 0 {
            vec![current_epoch]
        } else {
            vec![current_epoch, current_epoch - 1]
        };

        let mut out = Vec::new();
        let mut acks = Vec::new();
        for epoch in epochs {
            let pseudonym = pseudonym::derive(&self.self_sk, epoch);
            let stored = storage::retrieve_remote(
                self.transport.as_ref(),
                &self.storage_addr,
                &self.storage_state,
                pseudonym,
                self.storage_query_timeout,
            )
            .await?;

            for record in stored {
                match self.try_open(&record.ciphertext) {
                    Some(opened) => {
                        out.push(AsyncMessage {
                            sender_pk: opened.sender_pk,
                            plaintext: opened.payload,
                            msg_type: opened.msg_type,
                            stored_at: record.stored_at,
                        });
                        acks.push((record.recipient_pseudonym, record.id));
                    }
                    None => {
                        tracing::debug!(epoch, "stored message could not be opened with any held pre-key secret");
                    }
                }
            }
        }

        *self.pending_acks.lock().expect("pending acks lock") = acks;
        Ok(out)
    }

    fn try_open(&self, sealed_bytes: &[u8]) -> Option<wire::OpenedMessage> {
        let prekeys = self.local_prekeys.lock().expect("local prekeys lock");
        prekeys.iter().find_map(|k| wire::open(sealed_bytes, &k.secret).ok())
    }

    /// Delete the message at `index` of the most recent
    /// [`Self::retrieve_messages`] result from the storage node (§8
    /// scenario 6: "after `delete(id)` the store reports one fewer total
    /// message").
    pub async fn acknowledge(&self, index: usize) -> Result<()> {
        let (pseudonym, id) = {
            let acks = self.pending_acks.lock().expect("pending acks lock");
            *acks.get(index).ok_or_else(|| AsyncError::NotFound(format!("no retrieved message at index {index}")))?
        };
        storage::delete_remote(
            self.transport.as_ref(),
            &self.storage_addr,
            &self.storage_state,
            pseudonym,
            id,
            self.storage_query_timeout,
        )
        .await?;
        self.pending_acks.lock().expect("pending acks lock").retain(|(p, i)| !(*p == pseudonym && *i == id));
        Ok(())
    }
}
