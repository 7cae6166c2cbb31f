//! [`RuntimeKeyProvider`]: the concrete [`KeyProvider`] the runtime wires
//! into `tox-messaging`/`tox-group`, composing the local identity with
//! [`FriendManager`]'s public-key lookup.

use std::sync::Arc;

use tox_friend::FriendManager;
use tox_types::error::{Result, TypesError};
use tox_types::friend::FriendId;
use tox_types::identity::KeyPair;
use tox_types::traits::KeyProvider;

pub struct RuntimeKeyProvider {
    identity: KeyPair,
    friends: Arc<FriendManager>,
}

impl RuntimeKeyProvider {
    pub fn new(identity: KeyPair, friends: Arc<FriendManager>) -> Self {
        Self { identity, friends }
    }
}

impl KeyProvider for RuntimeKeyProvider {
    fn get_friend_public_key(&self, friend_id: FriendId) -> Result<[u8; 32]> {
        self.friends
            .get(friend_id)
            .map(|f| f.public_key)
            .ok_or_else(|| TypesError::NotFound(format!("friend {friend_id}")))
    }

    fn get_self_private_key(&self) -> Result<[u8; 32]> {
        Ok(self.identity.private)
    }
}
