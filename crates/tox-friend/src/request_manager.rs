//! `RequestManager`: the thread-safe collaborator tracking pending friend
//! requests (§4.1).
//!
//! Invariants enforced here: at most one pending request per sender key; a
//! duplicate `add` from the same sender refreshes the timestamp and clears
//! `handled`; `accept` is terminal-but-preserving (the request stays,
//! marked handled, so its `session_handle` remains inspectable), `reject`
//! removes it outright. The registered handler is always invoked with the
//! manager's internal lock released (§9 "Callback hazards") and wrapped in
//! a panic-recovery boundary so a panicking handler cannot poison the
//! lock or take down the caller.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use tox_types::friend::FriendRequest;

/// Invoked whenever a new (or refreshed) request is added.
pub type RequestHandler = Arc<dyn Fn(&FriendRequest) + Send + Sync>;

#[derive(Default)]
pub struct RequestManager {
    requests: Mutex<HashMap<[u8; 32], FriendRequest>>,
    handler: RwLock<Option<RequestHandler>>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_handler(&self, handler: RequestHandler) {
        *self.handler.write().expect("handler lock") = Some(handler);
    }

    /// Add (or refresh) a pending request. A duplicate by sender key
    /// updates the timestamp and clears `handled`.
    pub fn add(&self, mut request: FriendRequest) {
        {
            let mut requests = self.requests.lock().expect("requests lock");
            if let Some(existing) = requests.get_mut(&request.sender_pk) {
                existing.message = request.message.clone();
                existing.timestamp = request.timestamp;
                existing.nonce = request.nonce;
                existing.protocol = request.protocol;
                existing.capabilities = request.capabilities.clone();
                existing.handled = false;
            } else {
                request.handled = false;
                requests.insert(request.sender_pk, request.clone());
            }
        }

        let handler = self.handler.read().expect("handler lock").clone();
        if let Some(handler) = handler {
            let snapshot = self
                .requests
                .lock()
                .expect("requests lock")
                .get(&request.sender_pk)
                .cloned();
            if let Some(snapshot) = snapshot {
                invoke(&handler, &snapshot);
            }
        }
    }

    /// All requests that have not yet been accepted or rejected.
    pub fn get_pending(&self) -> Vec<FriendRequest> {
        self.requests
            .lock()
            .expect("requests lock")
            .values()
            .filter(|r| !r.handled)
            .cloned()
            .collect()
    }

    /// Mark the request from `sender_pk` as handled, preserving it (so
    /// its `session_handle`, if any, remains readable). Returns the
    /// request's session handle, if one was established.
    pub fn accept(&self, sender_pk: &[u8; 32]) -> Option<Option<u64>> {
        let mut requests = self.requests.lock().expect("requests lock");
        let request = requests.get_mut(sender_pk)?;
        request.handled = true;
        Some(request.session_handle)
    }

    /// Remove the request from `sender_pk`. Returns whether one existed.
    pub fn reject(&self, sender_pk: &[u8; 32]) -> bool {
        self.requests.lock().expect("requests lock").remove(sender_pk).is_some()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn invoke(handler: &RequestHandler, request: &FriendRequest) {
    if catch_unwind(AssertUnwindSafe(|| handler(request))).is_err() {
        tracing::error!("friend request handler panicked");
    }
}
