//! Subresource-integrity hashes for downloaded tarballs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha512};

const SHA512_PREFIX: &str = "sha512-";

/// Compute the SRI string (`sha512-<base64 digest>`) of `data`.
pub fn compute_integrity(data: &[u8]) -> String {
    let digest = Sha512::digest(data);
    format!("{}{}", SHA512_PREFIX, BASE64.encode(digest))
}

/// Whether `data` matches the SRI string `expected`.
pub fn verify_integrity(expected: &str, data: &[u8]) -> bool {
    expected == compute_integrity(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha512("abc"), base64-encoded.
        assert_eq!(
            compute_integrity(b"abc"),
            "sha512-3a81oZNherrMQXNJriBBMRLm+k6JqX6iCp7u5ktV05ohkpkqJ0/BqDa6PCOj/uu9RU1EI2Q86A4qmslPpUyknw=="
        );
    }

    #[test]
    fn test_verify() {
        let integrity = compute_integrity(b"tarball bytes");
        assert!(integrity.starts_with(SHA512_PREFIX));
        assert!(verify_integrity(&integrity, b"tarball bytes"));
        assert!(!verify_integrity(&integrity, b"tampered bytes"));
        assert!(!verify_integrity("sha256-whatever", b"tarball bytes"));
    }
}
