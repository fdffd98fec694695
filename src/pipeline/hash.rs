use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the uploaded bytes. Used as the analysis id.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Whether `id` has the shape of a content hash.
pub fn is_content_hash(id: &str) -> bool {
    id.len() == 64 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn same_bytes_same_hash() {
        assert_eq!(content_hash(b"contract"), content_hash(b"contract"));
        assert_ne!(content_hash(b"contract"), content_hash(b"contract v2"));
    }

    #[test]
    fn hash_shape() {
        assert!(is_content_hash(&content_hash(b"x")));
        assert!(!is_content_hash("ABC"));
        assert!(!is_content_hash(&"g".repeat(64)));
        assert!(!is_content_hash("../../etc/passwd"));
    }
}
