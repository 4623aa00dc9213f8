//! API key generation and hashing.

use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix carried by every issued key.
pub const API_KEY_PREFIX: &str = "pk_";

/// Generates a new raw API key.
pub fn generate_api_key() -> String {
    let raw: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("{}{}", API_KEY_PREFIX, raw)
}

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Verifies an API key against a stored hash using constant-time comparison.
pub fn verify_api_key(input: &str, stored_hash: &str) -> bool {
    let input_hash = hash_api_key(input);
    input_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_hashing() {
        let key = "pk_test_abc123";
        let hash = hash_api_key(key);

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_key(key));
    }

    #[test]
    fn test_api_key_verification() {
        let key = generate_api_key();
        let hash = hash_api_key(&key);

        assert!(verify_api_key(&key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn test_generated_keys_are_prefixed_and_distinct() {
        let a = generate_api_key();
        let b = generate_api_key();

        assert!(a.starts_with(API_KEY_PREFIX));
        assert_eq!(a.len(), API_KEY_PREFIX.len() + 32);
        assert_ne!(a, b);
    }
}
