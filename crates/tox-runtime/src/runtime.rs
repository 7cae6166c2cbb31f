//! `Runtime`: the composition layer (§10) that wires every subsystem
//! crate together against one local identity, the way `ochra-daemon`'s
//! `DaemonState` owns `Arc` handles to each of its subsystems. Unlike the
//! reference daemon, `Runtime` is a plain library struct — no JSON-RPC
//! server, no CLI, no process entry point (§1/§6 Non-goals) — the
//! embedding application drives it.
//!
//! Collaborators that have no single obviously-correct default (the
//! transport, the clock) are constructor-injected rather than built
//! internally, consistent with every other manager in this workspace.

use std::sync::Arc;

use tox_async::AsyncManager;
use tox_crypto::ed25519::SigningKey;
use tox_dht::{Dht, InMemoryDht};
use tox_friend::{FriendManager, RequestManager};
use tox_group::GroupManager;
use tox_messaging::{MessagingEngine, RetryConfig};
use tox_transport::{packet, Transport};
use tox_types::identity::KeyPair;
use tox_types::traits::{KeyProvider, TimeProvider};

use crate::address_book::AddressBook;
use crate::config::RuntimeConfig;
use crate::keys::RuntimeKeyProvider;
use crate::{Result, RuntimeError};

/// Every subsystem this core ships, wired against one local identity and
/// one transport.
pub struct Runtime {
    pub config: RuntimeConfig,
    pub identity: KeyPair,
    pub time: Arc<dyn TimeProvider>,
    pub transport: Arc<dyn Transport>,
    pub dht: Arc<dyn Dht>,
    pub friends: Arc<FriendManager>,
    pub requests: Arc<RequestManager>,
    pub address_book: Arc<AddressBook>,
    pub key_provider: Arc<dyn KeyProvider>,
    pub signing_key: Arc<SigningKey>,
    pub groups: Arc<GroupManager>,
    pub messaging: Arc<MessagingEngine>,
    pub async_messaging: Option<Arc<AsyncManager>>,
}

impl Runtime {
    /// Build every subsystem and wire its inbound handlers onto
    /// `transport`. `identity`'s private half is handed to
    /// [`RuntimeKeyProvider`] and to [`AsyncManager`] (which derives its
    /// own X25519 secret from it); nothing else in this crate reads it
    /// directly.
    pub fn new(config: RuntimeConfig, identity: KeyPair, time: Arc<dyn TimeProvider>, transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        let friends = Arc::new(FriendManager::new());
        let requests = Arc::new(RequestManager::new());
        let address_book = Arc::new(AddressBook::new());
        let key_provider: Arc<dyn KeyProvider> = Arc::new(RuntimeKeyProvider::new(identity.clone(), friends.clone()));
        let signing_key = Arc::new(SigningKey::from_bytes(&tox_crypto::blake3::derive_key(
            tox_crypto::blake3::contexts::GROUP_ROLE_CHANGE_SIGNING,
            &identity.private,
        )));

        let dht = Arc::new(InMemoryDht::new());
        transport.register_handler(packet::GROUP_ANNOUNCE, dht.clone().announce_handler());
        transport.register_handler(packet::GROUP_QUERY, dht.clone().query_handler(transport.clone()));
        transport.register_handler(packet::GROUP_QUERY_RESPONSE, dht.clone().response_handler());
        let dht: Arc<dyn Dht> = dht;

        let store = match &config.storage.data_dir {
            Some(dir) => {
                let path = std::path::Path::new(dir).join("messaging.db");
                Some(Arc::new(tox_db::SqliteMessageStore::open(&path).map_err(RuntimeError::Db)?)
                    as Arc<dyn tox_types::traits::MessageStore>)
            }
            None => None,
        };

        let groups = GroupManager::new(
            identity.public,
            Some(transport.clone()),
            Some(dht.clone()),
            address_book.clone(),
            Some(key_provider.clone()),
            time.clone(),
            Some(signing_key.clone()),
        );

        let messaging = MessagingEngine::new(
            transport.clone(),
            address_book.clone(),
            time.clone(),
            Some(key_provider.clone()),
            store,
            RetryConfig {
                max_retries: config.retry.max_retries,
                retry_interval_ms: config.retry.retry_interval_ms,
            },
        );
        messaging.load()?;

        let async_messaging = match &config.network.async_rendezvous_addr {
            Some(addr) => Some(AsyncManager::new(
                key_provider.as_ref(),
                time.clone(),
                transport.clone(),
                addr.clone(),
                addr.clone(),
            )?),
            None => None,
        };

        Ok(Arc::new(Self {
            config,
            identity,
            time,
            transport,
            dht,
            friends,
            requests,
            address_book,
            key_provider,
            signing_key,
            groups,
            messaging,
            async_messaging,
        }))
    }

    pub fn self_public_key(&self) -> [u8; 32] {
        self.identity.public
    }

    /// Seed the DHT routing table with `nodes`, e.g. from
    /// `config.network.bootstrap_nodes` once those addresses have been
    /// resolved to node identities by the embedding application (bare
    /// address strings alone don't carry a node id or public key, so
    /// this is a separate step rather than something `new` does itself).
    pub fn add_dht_nodes(&self, nodes: impl IntoIterator<Item = tox_dht::Node>) {
        for node in nodes {
            self.dht.add_node(node);
        }
    }

    /// Periodic maintenance tick: drives the messaging engine's retry
    /// queue and prunes expired group invitations. Intended to be called
    /// on a caller-owned cadence (§5 "no internal timer thread").
    pub async fn tick(&self) {
        self.messaging.process_pending().await;
        self.groups.cleanup_expired_invitations();
    }

    pub async fn shutdown(&self) {
        self.messaging.close().await;
    }
}
