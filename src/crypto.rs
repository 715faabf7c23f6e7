//! Symmetric encryption of the whole user data blob.
//!
//! The cipher key is derived from the application secret concatenated with the
//! user's password, so a dump of the remote store is unreadable without both.
//! Envelope layout (before base64): `salt(16) || nonce(12) || ciphertext`.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::error;
use zeroize::Zeroizing;

use crate::config::KdfParams;
use crate::error::JournalError;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Clone)]
pub struct Codec {
    app_secret: Zeroizing<String>,
    kdf: KdfParams,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").field("kdf", &self.kdf).finish_non_exhaustive()
    }
}

impl Codec {
    pub fn new(app_secret: &str, kdf: KdfParams) -> Self {
        Self {
            app_secret: Zeroizing::new(app_secret.to_string()),
            kdf,
        }
    }

    pub fn encrypt<T: Serialize>(&self, data: &T, password: &str) -> crate::Result<String> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(data).map_err(|e| JournalError::Encrypt(e.to_string()))?,
        );

        let mut salt = [0u8; SALT_LEN];
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(password, &salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| JournalError::Encrypt(e.to_string()))?;

        let mut envelope = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(envelope))
    }

    /// Returns `Ok(None)` for an empty envelope (nothing stored yet).
    pub fn decrypt<T: DeserializeOwned>(
        &self,
        encrypted: &str,
        password: &str,
    ) -> crate::Result<Option<T>> {
        if encrypted.is_empty() {
            return Ok(None);
        }

        let envelope = STANDARD.decode(encrypted).map_err(|e| {
            error!("Decryption error: invalid envelope encoding: {}", e);
            JournalError::Decrypt
        })?;
        if envelope.len() < SALT_LEN + NONCE_LEN {
            error!("Decryption error: envelope too short ({} bytes)", envelope.len());
            return Err(JournalError::Decrypt);
        }
        let (salt, rest) = envelope.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(password, salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
                .map_err(|_| JournalError::Decrypt)?,
        );

        serde_json::from_slice(&plaintext).map(Some).map_err(|e| {
            error!("Decryption error: payload is not a valid blob: {}", e);
            JournalError::Decrypt
        })
    }

    /// One-way digest compared against the stored login credential.
    pub fn hash_password(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher.update(self.app_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn derive_key(&self, password: &str, salt: &[u8]) -> crate::Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = Params::new(self.kdf.memory_kib, self.kdf.iterations, 1, Some(KEY_LEN))
            .map_err(|e| JournalError::Configuration(format!("Invalid KDF parameters: {}", e)))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut material = Zeroizing::new(String::with_capacity(
            self.app_secret.len() + password.len(),
        ));
        material.push_str(&self.app_secret);
        material.push_str(password);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon
            .hash_password_into(material.as_bytes(), salt, key.as_mut_slice())
            .map_err(|e| JournalError::Encrypt(format!("Key derivation failed: {}", e)))?;
        Ok(key)
    }
}
