//! Opaque token generation and hashing.
//!
//! Session, password-reset, and email-verification tokens all come from
//! [`generate_token`]; callers attach their own expiry and usage semantics.
//! Only the SHA-256 hash of a token is ever persisted.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// 256-bit cryptographically random token, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Random v4 UUID for row identifiers.
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// SHA-256 digest of a token, hex encoded, for at-rest storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_uuids_are_unique() {
        assert_ne!(generate_uuid(), generate_uuid());
    }

    #[test]
    fn test_hash_token_is_stable() {
        let token = generate_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_eq!(hash_token(&token).len(), 64);
    }
}
