//! AES-256-GCM sealing for credential secrets at rest.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use iamgate_application::SecretEncryptor;
use iamgate_core::{AppError, AppResult};

const NONCE_LENGTH: usize = 12;

/// AES-256-GCM encryptor for secret access keys and session tokens.
///
/// Output layout is `nonce (12 bytes) || ciphertext+tag`.
#[derive(Clone)]
pub struct AesSecretEncryptor {
    cipher: Aes256Gcm,
}

impl AesSecretEncryptor {
    /// Creates an encryptor from a 32-byte key.
    #[must_use]
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key_bytes.into()),
        }
    }

    /// Creates an encryptor from `CREDENTIAL_ENCRYPTION_KEY` hex.
    pub fn from_hex(hex_key: &str) -> AppResult<Self> {
        let decoded = hex::decode(hex_key.trim()).map_err(|error| {
            AppError::Validation(format!("invalid CREDENTIAL_ENCRYPTION_KEY hex: {error}"))
        })?;

        let key: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            AppError::Validation(
                "CREDENTIAL_ENCRYPTION_KEY must be exactly 32 bytes (64 hex chars)".to_owned(),
            )
        })?;

        Ok(Self::new(&key))
    }
}

impl SecretEncryptor for AesSecretEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext).map_err(|error| {
            AppError::Internal(format!("failed to encrypt credential secret: {error}"))
        })?;

        let mut sealed = Vec::with_capacity(nonce.len() + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8]) -> AppResult<Vec<u8>> {
        if sealed.len() <= NONCE_LENGTH {
            return Err(AppError::Internal(
                "sealed credential secret is too short".to_owned(),
            ));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
        let nonce_array: [u8; NONCE_LENGTH] = nonce_bytes
            .try_into()
            .map_err(|_| AppError::Internal("credential nonce must be 12 bytes".to_owned()))?;

        self.cipher
            .decrypt(&Nonce::from(nonce_array), ciphertext)
            .map_err(|error| {
                AppError::Internal(format!("failed to decrypt credential secret: {error}"))
            })
    }
}
