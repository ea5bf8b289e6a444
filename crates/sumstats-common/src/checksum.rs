//! Checksum utilities for payload verification

use crate::error::{CommonError, Result};
use sha2::{Digest, Sha256};

/// SHA-256 of an in-memory payload, lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compare a payload against an expected digest
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(CommonError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_hex() {
        assert_eq!(sha256_hex(b"hello world"), HELLO_WORLD);
    }

    #[test]
    fn test_verify_sha256() {
        assert!(verify_sha256(b"hello world", HELLO_WORLD).is_ok());
        assert!(verify_sha256(b"hello world", &HELLO_WORLD.to_uppercase()).is_ok());

        match verify_sha256(b"hello", HELLO_WORLD) {
            Err(CommonError::ChecksumMismatch { expected, .. }) => assert_eq!(expected, HELLO_WORLD),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }
}
