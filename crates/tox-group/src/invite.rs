//! The friend-invitation wire packet (§4.3 "Invitations"):
//! `[group_id:4][name_len:1][name:<=255][expires:8][privacy:1]`.

use tox_types::group::{GroupId, Privacy, MAX_GROUP_NAME_LEN};

use crate::{GroupError, Result};

fn privacy_byte(privacy: Privacy) -> u8 {
    match privacy {
        Privacy::Public => 0,
        Privacy::Private => 1,
    }
}

fn privacy_from_byte(byte: u8) -> Result<Privacy> {
    match byte {
        0 => Ok(Privacy::Public),
        1 => Ok(Privacy::Private),
        other => Err(GroupError::Validation(format!("unknown privacy byte {other}"))),
    }
}

/// Build the wire bytes for a group invitation. Fails if `name` exceeds
/// [`MAX_GROUP_NAME_LEN`] bytes (§8 boundary: 255 bytes accepted, 256
/// bytes is an invitation-packet-build error).
pub fn encode(group_id: GroupId, name: &str, expires_at: u64, privacy: Privacy) -> Result<Vec<u8>> {
    if name.len() > MAX_GROUP_NAME_LEN {
        return Err(GroupError::Validation(format!(
            "group name exceeds {MAX_GROUP_NAME_LEN} bytes for an invitation packet"
        )));
    }

    let mut bytes = Vec::with_capacity(4 + 1 + name.len() + 8 + 1);
    bytes.extend_from_slice(&group_id.to_be_bytes());
    bytes.push(name.len() as u8);
    bytes.extend_from_slice(name.as_bytes());
    bytes.extend_from_slice(&expires_at.to_be_bytes());
    bytes.push(privacy_byte(privacy));
    Ok(bytes)
}

/// Decoded invitation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub group_id: GroupId,
    pub name: String,
    pub expires_at: u64,
    pub privacy: Privacy,
}

pub fn decode(bytes: &[u8]) -> Result<Invitation> {
    if bytes.len() < 4 + 1 {
        return Err(GroupError::Validation("invitation packet too short".into()));
    }
    let group_id = GroupId::from_be_bytes(bytes[0..4].try_into().expect("4 bytes"));
    let name_len = bytes[4] as usize;
    let name_start = 5;
    let name_end = name_start + name_len;
    if bytes.len() < name_end + 8 + 1 {
        return Err(GroupError::Validation("invitation packet truncated".into()));
    }
    let name = String::from_utf8(bytes[name_start..name_end].to_vec())
        .map_err(|e| GroupError::Validation(format!("invitation name is not valid utf-8: {e}")))?;
    let expires_at = u64::from_be_bytes(bytes[name_end..name_end + 8].try_into().expect("8 bytes"));
    let privacy = privacy_from_byte(bytes[name_end + 8])?;
    Ok(Invitation {
        group_id,
        name,
        expires_at,
        privacy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let bytes = encode(42, "my group", 1_000, Privacy::Private).expect("encode");
        let decoded = decode(&bytes).expect("decode");
        assert_eq!(decoded.group_id, 42);
        assert_eq!(decoded.name, "my group");
        assert_eq!(decoded.expires_at, 1_000);
        assert_eq!(decoded.privacy, Privacy::Private);
    }

    #[test]
    fn name_at_max_length_is_accepted() {
        let name = "a".repeat(MAX_GROUP_NAME_LEN);
        assert!(encode(1, &name, 0, Privacy::Public).is_ok());
    }

    #[test]
    fn name_over_max_length_is_rejected() {
        let name = "a".repeat(MAX_GROUP_NAME_LEN + 1);
        assert!(encode(1, &name, 0, Privacy::Public).is_err());
    }

    #[test]
    fn truncated_packet_is_rejected() {
        assert!(decode(&[0, 0, 0, 1]).is_err());
    }
}
