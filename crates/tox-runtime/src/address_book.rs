//! [`AddressBook`]: the concrete [`FriendAddressResolver`] the runtime
//! wires into `tox-group`/`tox-messaging`. Neither crate's own entity
//! types carry a network address (by design — see
//! `tox_types::traits::FriendAddressResolver`'s doc comment), so the
//! composition layer is where one gets attached to a friend id.

use std::collections::HashMap;
use std::sync::RwLock;

use tox_types::error::{Result, TypesError};
use tox_types::friend::FriendId;
use tox_types::traits::{Addr, FriendAddressResolver};

#[derive(Default)]
pub struct AddressBook {
    addresses: RwLock<HashMap<FriendId, Addr>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, friend_id: FriendId, addr: Addr) {
        self.addresses.write().expect("addresses lock").insert(friend_id, addr);
    }

    pub fn remove(&self, friend_id: FriendId) {
        self.addresses.write().expect("addresses lock").remove(&friend_id);
    }
}

impl FriendAddressResolver for AddressBook {
    fn resolve(&self, friend_id: FriendId) -> Result<Addr> {
        self.addresses
            .read()
            .expect("addresses lock")
            .get(&friend_id)
            .cloned()
            .ok_or_else(|| TypesError::NotConfigured(format!("no known address for friend {friend_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_registered_friend() {
        let book = AddressBook::new();
        book.set(1, "127.0.0.1:1234".to_string());
        assert_eq!(book.resolve(1).expect("resolved"), "127.0.0.1:1234");
    }

    #[test]
    fn unknown_friend_is_not_configured() {
        let book = AddressBook::new();
        assert!(book.resolve(99).is_err());
    }
}
