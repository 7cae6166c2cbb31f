//! Domain-separated BLAKE3 hashing and key derivation.
//!
//! All key derivation in this crate goes through [`derive_key`] with a
//! registered context string, so keys used for unrelated purposes (a
//! friend-request ciphertext key vs. an async-messaging pseudonym) can
//! never collide even if derived from the same input material.

/// Registered context strings. Using an unregistered context string would
/// be a protocol violation — new uses must add a constant here.
pub mod contexts {
    pub const BOX_ENCRYPTION_KEY: &str = "Tox v1 crypto-box encryption key";
    pub const HANDSHAKE_TRANSPORT_KEY: &str = "Tox v1 noise-ik transport key";
    pub const ASYNC_PSEUDONYM: &str = "Tox v1 async-messaging pseudonym";
    pub const GROUP_ROLE_CHANGE_SIGNING: &str = "Tox v1 group role-change signing key";

    pub const ALL_CONTEXTS: &[&str] = &[
        BOX_ENCRYPTION_KEY,
        HANDSHAKE_TRANSPORT_KEY,
        ASYNC_PSEUDONYM,
        GROUP_ROLE_CHANGE_SIGNING,
    ];
}

/// Plain BLAKE3 hash, used for content addressing (e.g. node ids).
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a key using BLAKE3's built-in key-derivation mode. `context`
/// should be one of [`contexts::ALL_CONTEXTS`].
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    out.copy_from_slice(hasher.finalize().as_bytes());
    out
}

/// Whether `context` is one of the registered context strings.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let a = derive_key(contexts::BOX_ENCRYPTION_KEY, b"shared-secret");
        let b = derive_key(contexts::BOX_ENCRYPTION_KEY, b"shared-secret");
        assert_eq!(a, b);
    }

    #[test]
    fn derive_key_separates_contexts() {
        let a = derive_key(contexts::BOX_ENCRYPTION_KEY, b"same-input");
        let b = derive_key(contexts::ASYNC_PSEUDONYM, b"same-input");
        assert_ne!(a, b);
    }

    #[test]
    fn all_contexts_are_registered() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(is_registered_context(ctx));
        }
        assert!(!is_registered_context("Tox v1 made-up-context"));
    }
}
