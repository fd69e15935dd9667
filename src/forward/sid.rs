//! Short, Stripe-style external identifiers: `<prefix>_<base62>`

/// Generates opaque external ids for aggregates.
///
/// Injected into constructors rather than called as a free function so tests
/// can substitute a deterministic sequence (see [`crate::forward::testing::SequentialSidGenerator`]).
pub trait SidGenerator: Send + Sync {
    /// Generate a new SID with the given prefix, e.g. `"fa"` -> `"fa_3k9fQ..."`.
    fn generate(&self, prefix: &str) -> String;
}

/// Cryptographically random base62 SID generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSidGenerator;

impl SidGenerator for RandomSidGenerator {
    fn generate(&self, prefix: &str) -> String {
        let random_bytes: [u8; 16] = rand::random();
        format!("{}_{}", prefix, base62_encode(&random_bytes))
    }
}

/// Encode bytes as base62 (digits, uppercase, lowercase), no padding.
fn base62_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    // Treat the bytes as a big-endian integer and repeatedly divide by 62.
    let mut digits = bytes.to_vec();
    let mut encoded = Vec::new();

    while digits.iter().any(|&b| b != 0) {
        let mut remainder = 0u32;
        for digit in digits.iter_mut() {
            let value = (remainder << 8) | *digit as u32;
            *digit = (value / 62) as u8;
            remainder = value % 62;
        }
        encoded.push(ALPHABET[remainder as usize]);
    }

    if encoded.is_empty() {
        encoded.push(ALPHABET[0]);
    }

    encoded.reverse();
    String::from_utf8(encoded).expect("base62 alphabet is ASCII")
}

/// Returns true if `sid` has the form `<prefix>_<nonempty base62 body>`.
pub fn has_prefix(sid: &str, prefix: &str) -> bool {
    sid.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|body| !body.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_prefixed_sid() {
        let gen = RandomSidGenerator;
        let sid = gen.generate("fa");
        assert!(sid.starts_with("fa_"));
        assert!(has_prefix(&sid, "fa"));
    }

    #[test]
    fn sids_are_unique() {
        let gen = RandomSidGenerator;
        let a = gen.generate("fr");
        let b = gen.generate("fr");
        assert_ne!(a, b);
    }

    #[test]
    fn base62_encode_known_value() {
        let encoded = base62_encode(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(encoded, "1");
    }

    #[test]
    fn has_prefix_rejects_wrong_prefix() {
        assert!(!has_prefix("fr_abc123", "fa"));
        assert!(!has_prefix("fa_", "fa"));
    }
}
