//! Message content encryption at rest.
//!
//! Key: SHA-256 of the configured secret, used as an AES-256-GCM key.
//! Wire format: base64(nonce (12 bytes) || ciphertext (includes GCM tag)).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::ApiError;

const NONCE_LEN: usize = 12;

/// Symmetric cipher applied to message bodies. Empty content stays empty.
pub trait ContentCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, ApiError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, ApiError>;

    /// Decrypt for display. Content that cannot be decrypted is shown as empty.
    fn decrypt_or_empty(&self, ciphertext: &str) -> String {
        match self.decrypt(ciphertext) {
            Ok(plain) => plain,
            Err(err) => {
                tracing::warn!(%err, "message content could not be decrypted");
                String::new()
            }
        }
    }
}

pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl ContentCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, ApiError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes[..]);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| ApiError::internal("content encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, ApiError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|_| ApiError::bad_request("content is not valid base64"))?;
        if raw.len() < NONCE_LEN {
            return Err(ApiError::bad_request("content too short"));
        }
        let (nonce, body) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| ApiError::bad_request("content decryption failed"))?;
        String::from_utf8(plain).map_err(|_| ApiError::bad_request("content is not UTF-8"))
    }
}
