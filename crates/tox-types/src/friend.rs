//! Friend entity and friend-request data (§3 "Friend", "Friend Request").

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypesError};

/// Largest allowed display name, in bytes.
pub const MAX_NAME_LEN: usize = 128;
/// Largest allowed status message, in bytes.
pub const MAX_STATUS_LEN: usize = 1007;
/// Largest allowed friend-request message, in bytes.
pub const MAX_REQUEST_MESSAGE_LEN: usize = 1016;

pub type FriendId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    None,
    Away,
    Busy,
    Online,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    None,
    Tcp,
    Udp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Friend {
    pub id: FriendId,
    pub public_key: [u8; 32],
    name: String,
    status_message: String,
    pub presence: Presence,
    pub connection_status: ConnectionStatus,
    pub last_seen: u64,
}

impl Friend {
    pub fn new(id: FriendId, public_key: [u8; 32]) -> Self {
        Self {
            id,
            public_key,
            name: String::new(),
            status_message: String::new(),
            presence: Presence::None,
            connection_status: ConnectionStatus::None,
            last_seen: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.len() > MAX_NAME_LEN {
            return Err(TypesError::validation(format!(
                "friend name exceeds {MAX_NAME_LEN} bytes"
            )));
        }
        self.name = name;
        Ok(())
    }

    pub fn set_status_message(&mut self, status: impl Into<String>) -> Result<()> {
        let status = status.into();
        if status.len() > MAX_STATUS_LEN {
            return Err(TypesError::validation(format!(
                "friend status exceeds {MAX_STATUS_LEN} bytes"
            )));
        }
        self.status_message = status;
        Ok(())
    }

    /// Update connection status, bumping `last_seen` monotonically.
    pub fn set_connection_status(&mut self, status: ConnectionStatus, now: u64) {
        self.connection_status = status;
        if now > self.last_seen {
            self.last_seen = now;
        }
    }
}

/// Which handshake protocol a friend request was sent/received with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestProtocol {
    Legacy,
    Noise,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FriendRequest {
    pub sender_pk: [u8; 32],
    pub message: String,
    pub nonce: [u8; 24],
    pub timestamp: u64,
    pub handled: bool,
    pub protocol: RequestProtocol,
    pub capabilities: Option<Vec<String>>,
    pub session_handle: Option<u64>,
}

impl FriendRequest {
    pub fn validate_message(message: &str) -> Result<()> {
        if message.is_empty() {
            return Err(TypesError::validation("friend request message is empty"));
        }
        if message.len() > MAX_REQUEST_MESSAGE_LEN {
            return Err(TypesError::validation(format!(
                "friend request message exceeds {MAX_REQUEST_MESSAGE_LEN} bytes"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_length_enforced() {
        let mut f = Friend::new(1, [0u8; 32]);
        assert!(f.set_name("a".repeat(MAX_NAME_LEN)).is_ok());
        assert!(f.set_name("a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn last_seen_is_monotonic() {
        let mut f = Friend::new(1, [0u8; 32]);
        f.set_connection_status(ConnectionStatus::Udp, 100);
        f.set_connection_status(ConnectionStatus::None, 50);
        assert_eq!(f.last_seen, 100);
        f.set_connection_status(ConnectionStatus::Tcp, 200);
        assert_eq!(f.last_seen, 200);
    }

    #[test]
    fn request_message_bounds() {
        assert!(FriendRequest::validate_message("").is_err());
        assert!(FriendRequest::validate_message(&"a".repeat(MAX_REQUEST_MESSAGE_LEN)).is_ok());
        assert!(FriendRequest::validate_message(&"a".repeat(MAX_REQUEST_MESSAGE_LEN + 1)).is_err());
    }
}
