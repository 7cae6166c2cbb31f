//! Traffic-analysis padding for storage payloads (§4.2, §4.5, §9). The
//! same length-prefix-then-zero-pad policy as `tox-messaging::padding`,
//! applied against [`tox_types::STORAGE_PADDING_TIERS`] — kept as a
//! sibling implementation rather than a shared dependency since
//! `tox-async` and `tox-messaging` are independent consumers of
//! `tox-types`, not layered on each other.

use tox_types::{padded_length, MAX_PROCESSING_BUFFER};

#[derive(Debug, thiserror::Error)]
pub enum PaddingError {
    #[error("framed payload of {0} bytes exceeds the processing buffer ceiling")]
    BufferCeiling(usize),

    #[error("padded payload too short to carry a length prefix")]
    Truncated,

    #[error("declared length {declared} exceeds padded payload of {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("plaintext of {0} bytes is too large to length-prefix")]
    TooLarge(usize),
}

pub type Result<T> = std::result::Result<T, PaddingError>;

const LENGTH_PREFIX_LEN: usize = 4;

/// Prefix `plaintext` with its big-endian u32 length, then zero-pad to
/// the smallest tier in `tiers` that fits the framed payload. Larger than
/// the largest tier is left length-prefixed but otherwise unpadded.
pub fn pad(plaintext: &[u8], tiers: &[usize]) -> Result<Vec<u8>> {
    if plaintext.len() > u32::MAX as usize {
        return Err(PaddingError::TooLarge(plaintext.len()));
    }
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_LEN + plaintext.len());
    framed.extend_from_slice(&(plaintext.len() as u32).to_be_bytes());
    framed.extend_from_slice(plaintext);

    if framed.len() > MAX_PROCESSING_BUFFER {
        return Err(PaddingError::BufferCeiling(framed.len()));
    }

    match padded_length(framed.len(), tiers) {
        Some(target) => {
            framed.resize(target, 0);
            Ok(framed)
        }
        None => Ok(framed),
    }
}

/// Recover the original plaintext from a padded, length-prefixed payload.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>> {
    if padded.len() < LENGTH_PREFIX_LEN {
        return Err(PaddingError::Truncated);
    }
    let mut len_bytes = [0u8; LENGTH_PREFIX_LEN];
    len_bytes.copy_from_slice(&padded[..LENGTH_PREFIX_LEN]);
    let declared = u32::from_be_bytes(len_bytes) as usize;
    let body = &padded[LENGTH_PREFIX_LEN..];
    if declared > body.len() {
        return Err(PaddingError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    Ok(body[..declared].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tox_types::STORAGE_PADDING_TIERS;

    #[test]
    fn pads_to_least_sufficient_tier() {
        let padded = pad(b"offline-hi", &STORAGE_PADDING_TIERS).expect("pad");
        assert_eq!(padded.len(), 256);
    }

    #[test]
    fn round_trip_recovers_exact_plaintext() {
        let original = b"a message left while you were away";
        let padded = pad(original, &STORAGE_PADDING_TIERS).expect("pad");
        assert_eq!(unpad(&padded).expect("unpad"), original);
    }

    #[test]
    fn payload_at_storage_ceiling_round_trips() {
        let payload = vec![0x5Au8; 16_000];
        let padded = pad(&payload, &STORAGE_PADDING_TIERS).expect("pad");
        assert_eq!(padded.len(), 16384);
        assert_eq!(unpad(&padded).expect("unpad"), payload);
    }

    #[test]
    fn truncated_payload_rejected() {
        assert!(unpad(&[0u8; 2]).is_err());
    }

    #[test]
    fn corrupted_length_prefix_rejected() {
        let mut padded = pad(b"hi", &STORAGE_PADDING_TIERS).expect("pad");
        padded[0..4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(unpad(&padded).is_err());
    }
}
