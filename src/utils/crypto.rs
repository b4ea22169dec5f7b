//! Refresh-token cipher.
//!
//! Credentials are stored as `hex(iv):hex(ciphertext)` where the IV is a fresh
//! 12-byte nonce and the ciphertext carries the AES-256-GCM tag.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

const IV_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("malformed credential: {0}")]
    Malformed(&'static str),
    #[error("credential encryption failed")]
    Encrypt,
    #[error("credential could not be decrypted with the configured key")]
    Decrypt,
}

#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").field("key", &"[REDACTED]").finish()
    }
}

impl TokenCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;
        Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CipherError> {
        let (iv_hex, ct_hex) = stored
            .split_once(':')
            .ok_or(CipherError::Malformed("missing iv separator"))?;
        let iv = hex::decode(iv_hex).map_err(|_| CipherError::Malformed("iv is not hex"))?;
        if iv.len() != IV_LEN {
            return Err(CipherError::Malformed("iv must be 12 bytes"));
        }
        let ciphertext =
            hex::decode(ct_hex).map_err(|_| CipherError::Malformed("ciphertext is not hex"))?;
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| CipherError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Malformed("plaintext is not utf-8"))
    }
}
