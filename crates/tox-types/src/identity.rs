//! Key material and the public Tox address (§3 "Identity").

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, TypesError};

/// A Curve25519 key pair. The private half zeroizes on drop; `tox-crypto`
/// is responsible for actually performing Diffie-Hellman / AEAD operations
/// with it, this crate only carries the bytes.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct KeyPair {
    #[zeroize(skip)]
    pub public: [u8; 32],
    pub private: [u8; 32],
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public))
            .field("private", &"<redacted>")
            .finish()
    }
}

/// A 24-byte nonce, generated fresh for every encryption.
pub type Nonce = [u8; 24];

/// Number of bytes in a Tox address: public key (32) ‖ nospam (4) ‖ checksum (2).
pub const TOX_ADDRESS_LEN: usize = 38;

/// The user-facing Tox address: public key, a rotatable anti-spam token,
/// and a checksum over both.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToxID {
    pub public_key: [u8; 32],
    pub nospam: [u8; 4],
    checksum: [u8; 2],
}

impl ToxID {
    /// Build a Tox ID, computing the checksum over `public_key || nospam`.
    pub fn new(public_key: [u8; 32], nospam: [u8; 4]) -> Self {
        let checksum = compute_checksum(&public_key, &nospam);
        Self {
            public_key,
            nospam,
            checksum,
        }
    }

    pub fn checksum(&self) -> [u8; 2] {
        self.checksum
    }

    /// Encode as 76 uppercase hex characters (38 bytes).
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(TOX_ADDRESS_LEN);
        bytes.extend_from_slice(&self.public_key);
        bytes.extend_from_slice(&self.nospam);
        bytes.extend_from_slice(&self.checksum);
        hex::encode_upper(bytes)
    }

    /// Decode from hex and verify the embedded checksum.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| TypesError::validation(format!("invalid tox id hex: {e}")))?;
        if bytes.len() != TOX_ADDRESS_LEN {
            return Err(TypesError::validation(format!(
                "tox id must decode to {TOX_ADDRESS_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&bytes[0..32]);
        let mut nospam = [0u8; 4];
        nospam.copy_from_slice(&bytes[32..36]);
        let mut checksum = [0u8; 2];
        checksum.copy_from_slice(&bytes[36..38]);

        let expected = compute_checksum(&public_key, &nospam);
        if expected != checksum {
            return Err(TypesError::validation("tox id checksum mismatch"));
        }
        Ok(Self {
            public_key,
            nospam,
            checksum,
        })
    }
}

impl std::fmt::Debug for ToxID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ToxID({})", self.to_hex())
    }
}

/// XOR-fold `public_key || nospam` two bytes at a time into a 2-byte checksum.
fn compute_checksum(public_key: &[u8; 32], nospam: &[u8; 4]) -> [u8; 2] {
    let mut acc = [0u8; 2];
    let mut i = 0;
    for byte in public_key.iter().chain(nospam.iter()) {
        acc[i % 2] ^= byte;
        i += 1;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_is_identity() {
        let id = ToxID::new([7u8; 32], [1, 2, 3, 4]);
        let hex = id.to_hex();
        let decoded = ToxID::from_hex(&hex).expect("round trip decode");
        assert_eq!(decoded, id);
    }

    #[test]
    fn tampered_checksum_is_rejected() {
        let id = ToxID::new([9u8; 32], [0, 0, 0, 1]);
        let mut hex = id.to_hex();
        // flip the last hex character to corrupt the checksum byte.
        let last = hex.pop().expect("non-empty hex");
        let flipped = if last == '0' { '1' } else { '0' };
        hex.push(flipped);
        assert!(ToxID::from_hex(&hex).is_err());
    }

    #[test]
    fn keypair_debug_redacts_private_key() {
        let kp = KeyPair {
            public: [1u8; 32],
            private: [2u8; 32],
        };
        let debug = format!("{kp:?}");
        assert!(!debug.contains("0202"));
    }
}
