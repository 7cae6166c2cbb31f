//! Group (chat) entity data (§3 "Group (Chat)", §4.3).

use serde::{Deserialize, Serialize};

pub type GroupId = u32;
pub type PeerId = u32;

/// Strictly ordered group roles; derive order puts `User` lowest, `Founder`
/// highest, matching `User < Moderator < Admin < Founder` from §4.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Moderator,
    Admin,
    Founder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Text,
    Av,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Public,
    Private,
}

/// Connection status for a peer, as seen by the local `Chat`. `0` offline,
/// `1` TCP, `2` UDP, matching the wire-level encoding in §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PeerConnection {
    Offline = 0,
    Tcp = 1,
    Udp = 2,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: PeerId,
    pub display_name: String,
    pub role: Role,
    pub connection: PeerConnection,
    pub public_key: [u8; 32],
    pub cached_address: Option<String>,
    pub last_active: u64,
}

impl Peer {
    pub fn is_online(&self) -> bool {
        !matches!(self.connection, PeerConnection::Offline)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingInvitation {
    pub friend_id: u32,
    pub group_id: GroupId,
    pub issued_at: u64,
    pub expires_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub chat_type: ChatType,
    pub privacy: Privacy,
    pub self_peer_id: PeerId,
    pub created_at: u64,
}

/// The DHT-announced summary of a group, used for discovery (§3, §4.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupAnnouncement {
    pub group_id: GroupId,
    pub name: String,
    pub chat_type: ChatType,
    pub privacy: Privacy,
    pub timestamp: u64,
    pub ttl: u64,
}

/// Default group-announcement TTL: 24 hours, in seconds.
pub const GROUP_ANNOUNCEMENT_TTL_SECS: u64 = 24 * 3600;
/// Default friend-invitation TTL: 24 hours, in seconds.
pub const INVITATION_TTL_SECS: u64 = 24 * 3600;
/// Largest group name accepted into an invitation packet (§4.3, §8).
pub const MAX_GROUP_NAME_LEN: usize = 255;
/// Broadcast worker-pool cap (§4.3, §9).
pub const BROADCAST_WORKER_CAP: usize = 10;
/// Number of DHT-closest nodes tried per recipient on cache miss (§4.3).
pub const BROADCAST_DHT_FANOUT: usize = 4;
