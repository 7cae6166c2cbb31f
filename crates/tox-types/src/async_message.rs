//! Async (offline) messaging data, as seen by the storage node (§3, §4.5).

use serde::{Deserialize, Serialize};

pub type Pseudonym = [u8; 32];
pub type StorageMessageId = [u8; 16];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncMessageType {
    Normal,
    Action,
    PreKeyBundle,
}

/// A message as the storage node holds it: pseudonymous, opaque ciphertext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: StorageMessageId,
    pub recipient_pseudonym: Pseudonym,
    pub sender_pseudonym: Pseudonym,
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 24],
    pub msg_type: AsyncMessageType,
    pub stored_at: u64,
    pub ttl: u64,
}

impl StoredMessage {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.stored_at.saturating_add(self.ttl)
    }
}

/// A message as the client sees it after decrypting a retrieved record.
#[derive(Clone, Debug)]
pub struct AsyncMessage {
    pub sender_pk: [u8; 32],
    pub plaintext: Vec<u8>,
    pub msg_type: AsyncMessageType,
    pub stored_at: u64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total: u64,
    pub unique_recipients: u64,
    pub capacity: u64,
    pub utilization_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_of_exact_boundary() {
        let msg = StoredMessage {
            id: [0u8; 16],
            recipient_pseudonym: [1u8; 32],
            sender_pseudonym: [2u8; 32],
            ciphertext: vec![],
            nonce: [0u8; 24],
            msg_type: AsyncMessageType::Normal,
            stored_at: 1000,
            ttl: 500,
        };
        assert!(!msg.is_expired(1499));
        assert!(msg.is_expired(1500));
        assert!(msg.is_expired(1600));
    }
}
