//! Content digests

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Compare a user-supplied hex digest with a computed one, ignoring case and
/// surrounding whitespace.
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_digest_matches_is_case_insensitive() {
        let actual = sha256_hex(b"abc");
        assert!(digest_matches(&actual.to_uppercase(), &actual));
        assert!(digest_matches(&format!("  {actual}\n"), &actual));
        assert!(!digest_matches("deadbeef", &actual));
    }
}
