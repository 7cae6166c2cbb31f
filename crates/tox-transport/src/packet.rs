//! Stable packet type tags (§6).

/// Friend message: `[tag:1][friend_id:4 BE][message_type:1][message_text...]`.
pub const FRIEND_MESSAGE: u8 = 0x01;

/// Friend request: the recipient infers the handshake protocol from the
/// first byte of the ciphertext itself (`0x00` legacy, `0x01` noise, §4.1),
/// so this is the transport-level tag used only to route the packet to
/// the friend-request handler before that inner byte is inspected.
pub const FRIEND_REQUEST: u8 = 0x02;

pub const GROUP_BROADCAST: u8 = 0x10;
pub const GROUP_INVITE: u8 = 0x11;
pub const GROUP_ANNOUNCE: u8 = 0x12;
pub const GROUP_QUERY: u8 = 0x13;
pub const GROUP_QUERY_RESPONSE: u8 = 0x14;

/// Async (offline) storage-node RPCs (§4.5). The storage node itself is
/// reached as just another transport peer; these tags route a client's
/// store/retrieve/delete request to the storage node's handlers and the
/// matching response back to the client's per-call waiter.
pub const ASYNC_STORE: u8 = 0x20;
pub const ASYNC_STORE_RESPONSE: u8 = 0x21;
pub const ASYNC_RETRIEVE: u8 = 0x22;
pub const ASYNC_RETRIEVE_RESPONSE: u8 = 0x23;
pub const ASYNC_DELETE: u8 = 0x24;
pub const ASYNC_DELETE_RESPONSE: u8 = 0x25;
pub const ASYNC_PREKEY_PUBLISH: u8 = 0x26;
pub const ASYNC_PREKEY_QUERY: u8 = 0x27;
pub const ASYNC_PREKEY_RESPONSE: u8 = 0x28;

/// A typed wrapper over the raw `u8` tags, for call sites that want
/// exhaustive matching instead of bare constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketTag {
    FriendMessage,
    FriendRequest,
    GroupBroadcast,
    GroupInvite,
    GroupAnnounce,
    GroupQuery,
    GroupQueryResponse,
    AsyncStore,
    AsyncStoreResponse,
    AsyncRetrieve,
    AsyncRetrieveResponse,
    AsyncDelete,
    AsyncDeleteResponse,
    AsyncPreKeyPublish,
    AsyncPreKeyQuery,
    AsyncPreKeyResponse,
    Unknown(u8),
}

impl From<u8> for PacketTag {
    fn from(tag: u8) -> Self {
        match tag {
            FRIEND_MESSAGE => PacketTag::FriendMessage,
            FRIEND_REQUEST => PacketTag::FriendRequest,
            GROUP_BROADCAST => PacketTag::GroupBroadcast,
            GROUP_INVITE => PacketTag::GroupInvite,
            GROUP_ANNOUNCE => PacketTag::GroupAnnounce,
            GROUP_QUERY => PacketTag::GroupQuery,
            GROUP_QUERY_RESPONSE => PacketTag::GroupQueryResponse,
            ASYNC_STORE => PacketTag::AsyncStore,
            ASYNC_STORE_RESPONSE => PacketTag::AsyncStoreResponse,
            ASYNC_RETRIEVE => PacketTag::AsyncRetrieve,
            ASYNC_RETRIEVE_RESPONSE => PacketTag::AsyncRetrieveResponse,
            ASYNC_DELETE => PacketTag::AsyncDelete,
            ASYNC_DELETE_RESPONSE => PacketTag::AsyncDeleteResponse,
            ASYNC_PREKEY_PUBLISH => PacketTag::AsyncPreKeyPublish,
            ASYNC_PREKEY_QUERY => PacketTag::AsyncPreKeyQuery,
            ASYNC_PREKEY_RESPONSE => PacketTag::AsyncPreKeyResponse,
            other => PacketTag::Unknown(other),
        }
    }
}

impl From<PacketTag> for u8 {
    fn from(tag: PacketTag) -> u8 {
        match tag {
            PacketTag::FriendMessage => FRIEND_MESSAGE,
            PacketTag::FriendRequest => FRIEND_REQUEST,
            PacketTag::GroupBroadcast => GROUP_BROADCAST,
            PacketTag::GroupInvite => GROUP_INVITE,
            PacketTag::GroupAnnounce => GROUP_ANNOUNCE,
            PacketTag::GroupQuery => GROUP_QUERY,
            PacketTag::GroupQueryResponse => GROUP_QUERY_RESPONSE,
            PacketTag::AsyncStore => ASYNC_STORE,
            PacketTag::AsyncStoreResponse => ASYNC_STORE_RESPONSE,
            PacketTag::AsyncRetrieve => ASYNC_RETRIEVE,
            PacketTag::AsyncRetrieveResponse => ASYNC_RETRIEVE_RESPONSE,
            PacketTag::AsyncDelete => ASYNC_DELETE,
            PacketTag::AsyncDeleteResponse => ASYNC_DELETE_RESPONSE,
            PacketTag::AsyncPreKeyPublish => ASYNC_PREKEY_PUBLISH,
            PacketTag::AsyncPreKeyQuery => ASYNC_PREKEY_QUERY,
            PacketTag::AsyncPreKeyResponse => ASYNC_PREKEY_RESPONSE,
            PacketTag::Unknown(b) => b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        for tag in [
            PacketTag::FriendMessage,
            PacketTag::FriendRequest,
            PacketTag::GroupBroadcast,
            PacketTag::GroupInvite,
            PacketTag::GroupAnnounce,
            PacketTag::GroupQuery,
            PacketTag::GroupQueryResponse,
            PacketTag::AsyncStore,
            PacketTag::AsyncStoreResponse,
            PacketTag::AsyncRetrieve,
            PacketTag::AsyncRetrieveResponse,
            PacketTag::AsyncDelete,
            PacketTag::AsyncDeleteResponse,
            PacketTag::AsyncPreKeyPublish,
            PacketTag::AsyncPreKeyQuery,
            PacketTag::AsyncPreKeyResponse,
        ] {
            let byte: u8 = tag.into();
            assert_eq!(PacketTag::from(byte), tag);
        }
    }

    #[test]
    fn unrecognized_byte_is_unknown() {
        assert_eq!(PacketTag::from(0xFF), PacketTag::Unknown(0xFF));
    }
}
