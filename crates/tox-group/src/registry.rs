//! The two process-wide maps §9 calls out ("Global registries"):
//! a cache of group announcements this process has seen, and the set of
//! per-query DHT response handlers currently awaiting an answer.
//!
//! Both are ordinary constructor-injected objects (`GroupManager` owns
//! one instance of each), not actual process globals, per §9's
//! "encapsulate these behind a typed registry object ... to avoid test
//! coupling and to allow multiple independent cores per process".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::oneshot;
use tox_types::group::{GroupAnnouncement, GroupId};

/// Local cache of group announcements, consulted before falling back to a
/// DHT query (§4.3 "Joining", tier 1).
#[derive(Default)]
pub struct AnnouncementRegistry {
    announcements: RwLock<HashMap<GroupId, GroupAnnouncement>>,
}

impl AnnouncementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, announcement: GroupAnnouncement) {
        self.announcements
            .write()
            .expect("announcements lock")
            .insert(announcement.group_id, announcement);
    }

    pub fn get(&self, group_id: GroupId) -> Option<GroupAnnouncement> {
        self.announcements.read().expect("announcements lock").get(&group_id).cloned()
    }
}

/// A per-query handler key: the group being queried plus a per-call
/// suffix, so concurrent `Join` calls for the same group don't collide
/// (§4.3 "each join registers a per-call response handler keyed by
/// `(group_id, unique_suffix)`").
pub type ResponseHandlerKey = (GroupId, u64);

/// Registry of per-query DHT response handlers. The single, process-wide
/// `Dht::set_group_response_callback` fans every inbound announcement out
/// through [`Self::dispatch`], which wakes whichever registered handlers
/// are waiting on that group id (§4.4, §5).
#[derive(Default)]
pub struct ResponseHandlerRegistry {
    handlers: RwLock<HashMap<ResponseHandlerKey, oneshot::Sender<GroupAnnouncement>>>,
    next_suffix: AtomicU64,
}

impl ResponseHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `group_id`; returns its key (for later
    /// deregistration) and the receiving half.
    pub fn register(&self, group_id: GroupId) -> (ResponseHandlerKey, oneshot::Receiver<GroupAnnouncement>) {
        let suffix = self.next_suffix.fetch_add(1, Ordering::SeqCst);
        let key = (group_id, suffix);
        let (tx, rx) = oneshot::channel();
        self.handlers.write().expect("handlers lock").insert(key, tx);
        (key, rx)
    }

    /// Remove a handler, whether or not it ever fired. Safe to call twice
    /// (e.g. once from a timeout branch and once from a drop guard).
    pub fn deregister(&self, key: ResponseHandlerKey) {
        self.handlers.write().expect("handlers lock").remove(&key);
    }

    /// Number of handlers currently registered (used by tests to confirm
    /// a timed-out handler was actually cleaned up, §8 scenario 5).
    pub fn len(&self) -> usize {
        self.handlers.read().expect("handlers lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fan an inbound announcement out to every handler registered for
    /// its group id. Handlers are one-shot: once woken they are removed.
    pub fn dispatch(&self, announcement: GroupAnnouncement) {
        let matching: Vec<ResponseHandlerKey> = {
            let handlers = self.handlers.read().expect("handlers lock");
            handlers.keys().filter(|(group_id, _)| *group_id == announcement.group_id).copied().collect()
        };
        for key in matching {
            if let Some(tx) = self.handlers.write().expect("handlers lock").remove(&key) {
                let _ = tx.send(announcement.clone());
            }
        }
    }
}
