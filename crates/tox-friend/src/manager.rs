//! `FriendManager`: the entity store for established friends (§3 "Friend").
//!
//! Friends are created on request accept or outgoing add, and destroyed
//! on removal; this manager does not itself speak the request protocol
//! (see [`crate::request`]/[`crate::request_manager`]) — it just owns the
//! resulting relationship state.

use std::collections::HashMap;
use std::sync::RwLock;

use tox_types::friend::{ConnectionStatus, Friend, FriendId};

use crate::{FriendError, Result};

#[derive(Default)]
pub struct FriendManager {
    friends: RwLock<HashMap<FriendId, Friend>>,
    next_id: std::sync::atomic::AtomicU32,
}

impl FriendManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a friend entry for `public_key`, assigning the next
    /// monotonic id. Fails if a friend with that key already exists.
    pub fn add_friend(&self, public_key: [u8; 32]) -> Result<FriendId> {
        let mut friends = self.friends.write().expect("friends lock");
        if friends.values().any(|f| f.public_key == public_key) {
            return Err(FriendError::Duplicate(
                "friend with this public key already exists".into(),
            ));
        }
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        friends.insert(id, Friend::new(id, public_key));
        Ok(id)
    }

    pub fn remove_friend(&self, id: FriendId) -> Result<()> {
        self.friends
            .write()
            .expect("friends lock")
            .remove(&id)
            .ok_or_else(|| FriendError::NotFound(format!("friend {id}")))?;
        Ok(())
    }

    pub fn get(&self, id: FriendId) -> Option<Friend> {
        self.friends.read().expect("friends lock").get(&id).cloned()
    }

    pub fn find_by_public_key(&self, public_key: &[u8; 32]) -> Option<Friend> {
        self.friends
            .read()
            .expect("friends lock")
            .values()
            .find(|f| &f.public_key == public_key)
            .cloned()
    }

    pub fn list(&self) -> Vec<Friend> {
        self.friends.read().expect("friends lock").values().cloned().collect()
    }

    pub fn set_name(&self, id: FriendId, name: impl Into<String>) -> Result<()> {
        let mut friends = self.friends.write().expect("friends lock");
        let friend = friends.get_mut(&id).ok_or_else(|| FriendError::NotFound(format!("friend {id}")))?;
        friend.set_name(name)?;
        Ok(())
    }

    pub fn set_status_message(&self, id: FriendId, status: impl Into<String>) -> Result<()> {
        let mut friends = self.friends.write().expect("friends lock");
        let friend = friends.get_mut(&id).ok_or_else(|| FriendError::NotFound(format!("friend {id}")))?;
        friend.set_status_message(status)?;
        Ok(())
    }

    pub fn set_connection_status(&self, id: FriendId, status: ConnectionStatus, now: u64) -> Result<()> {
        let mut friends = self.friends.write().expect("friends lock");
        let friend = friends.get_mut(&id).ok_or_else(|| FriendError::NotFound(format!("friend {id}")))?;
        friend.set_connection_status(status, now);
        Ok(())
    }
}
