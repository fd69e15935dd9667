//! API token generation, hashing, and constant-time verification

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

/// Generates and verifies agent/rule API tokens.
///
/// Only the hash is ever persisted; the plain token is returned once, at
/// generation time, so the caller can hand it to the agent out of band.
pub trait TokenGenerator: Send + Sync {
    /// Draws 32 random bytes, URL-safe-base64-encodes them (no padding), and
    /// prefixes the result with `<prefix>_`. Returns `(plain_token, token_hash)`.
    fn generate_api_token(&self, prefix: &str) -> (String, String);

    /// Deterministic one-way hash of a plain token (SHA-256 hex, lowercase).
    fn hash_token(&self, plain_token: &str) -> String;

    /// Recomputes the hash of `plain` and compares it to `hash` in constant time.
    fn verify_token(&self, plain: &str, hash: &str) -> bool {
        constant_time_compare(&self.hash_token(plain), hash)
    }
}

/// SHA-256-backed token generator, the only implementation this crate ships.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256TokenGenerator;

impl TokenGenerator for Sha256TokenGenerator {
    fn generate_api_token(&self, prefix: &str) -> (String, String) {
        let random_bytes: [u8; 32] = rand::random();
        let encoded = URL_SAFE_NO_PAD.encode(random_bytes);
        let plain = format!("{}_{}", prefix, encoded);
        let hash = self.hash_token(&plain);
        (plain, hash)
    }

    fn hash_token(&self, plain_token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(plain_token.as_bytes());
        hex_lower(&hasher.finalize())
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{:02x}", byte).expect("writing to a String never fails");
    }
    out
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_api_token_has_prefix() {
        let gen = Sha256TokenGenerator;
        let (plain, hash) = gen.generate_api_token("fpa");
        assert!(plain.starts_with("fpa_"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn tokens_are_unique() {
        let gen = Sha256TokenGenerator;
        let (plain1, _) = gen.generate_api_token("fpa");
        let (plain2, _) = gen.generate_api_token("fpa");
        assert_ne!(plain1, plain2);
    }

    #[test]
    fn verify_round_trip() {
        let gen = Sha256TokenGenerator;
        let (plain, hash) = gen.generate_api_token("fpa");
        assert!(gen.verify_token(&plain, &hash));
        assert!(!gen.verify_token(&format!("{}x", &plain[..plain.len() - 1]), &hash));
    }

    #[test]
    fn hash_token_is_deterministic() {
        let gen = Sha256TokenGenerator;
        assert_eq!(gen.hash_token("abc"), gen.hash_token("abc"));
        assert_ne!(gen.hash_token("abc"), gen.hash_token("abd"));
    }

    #[test]
    fn constant_time_compare_rejects_length_mismatch() {
        assert!(!constant_time_compare("abc", "abcd"));
        assert!(constant_time_compare("abc", "abc"));
    }
}
