//! Per-message state machine data (§3 "Message", §4.2).

use serde::{Deserialize, Serialize};

pub type MessageId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Normal,
    Action,
}

/// A message's place in the delivery state machine (§4.2).
///
/// Terminal states: `Read`, `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Pending,
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageState::Read | MessageState::Failed)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub friend_id: u32,
    pub msg_type: MessageType,
    pub text: String,
    pub created_at: u64,
    pub state: MessageState,
    pub retry_count: u32,
    pub last_attempt: Option<u64>,
}

impl Message {
    pub fn new(id: MessageId, friend_id: u32, msg_type: MessageType, text: String, now: u64) -> Self {
        Self {
            id,
            friend_id,
            msg_type,
            text,
            created_at: now,
            state: MessageState::Pending,
            retry_count: 0,
            last_attempt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(MessageState::Read.is_terminal());
        assert!(MessageState::Failed.is_terminal());
        assert!(!MessageState::Pending.is_terminal());
        assert!(!MessageState::Delivered.is_terminal());
    }
}
