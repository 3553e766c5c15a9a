use sha2::{Digest, Sha256};

/// Derive the AES-256 key from the configured secret.
/// Any non-empty secret yields a full-width key; the same secret always
/// yields the same key so stored credentials survive restarts.
pub fn derive_key(secret: &str) -> [u8; 32] {
    let digest = Sha256::digest(secret.as_bytes());
    digest.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_secret_same_key() {
        assert_eq!(derive_key("s3cret"), derive_key("s3cret"));
    }

    #[test]
    fn different_secret_different_key() {
        assert_ne!(derive_key("s3cret"), derive_key("s3cret "));
    }
}
