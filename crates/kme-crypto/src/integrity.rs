//! Plaintext integrity hashing, checked on every successful decrypt.

use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Constant-time comparison against a stored hash.
pub fn verify(data: &[u8], expected: &[u8]) -> bool {
    let actual = hash_data(data);
    constant_time_eq(&actual, expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_hash() {
        let data = b"raw key bytes";
        let hash = hash_data(data);
        assert!(verify(data, &hash[..]));
    }

    #[test]
    fn rejects_tampered_data() {
        let data = b"raw key bytes";
        let hash = hash_data(data);
        assert!(!verify(b"raw key byteZ", &hash[..]));
    }
}
