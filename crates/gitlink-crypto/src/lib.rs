/// gitlink Crypto Library
///
/// Credential encryption at rest: AES-256-GCM keyed by a 256-bit key derived
/// from the operator-configured secret. Ciphertext is self-describing
/// (`base64(nonce || ciphertext || tag)`) so it can be stored as a string field.
pub mod encrypt;
pub mod keys;

use anyhow::Result;

pub use keys::derive_key;

/// Symmetric cipher the credential vault consumes.
pub trait TokenCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, encoded: &str) -> Result<String>;
}

/// AES-256-GCM cipher bound to one configured secret.
#[derive(Clone)]
pub struct AesGcmCipher {
    key: [u8; 32],
}

impl AesGcmCipher {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            key: derive_key(secret),
        }
    }
}

impl TokenCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        encrypt::encrypt_token(&self.key, plaintext)
    }

    fn decrypt(&self, encoded: &str) -> Result<String> {
        encrypt::decrypt_token(&self.key, encoded)
    }
}
