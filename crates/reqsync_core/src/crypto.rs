//! Field encryption for values that must leave the device encrypted.
//!
//! Environment variable values and history cookie jars are sealed with
//! AES-256-GCM before they are placed into a remote record. The key comes
//! from a [`KeyProvider`], which stands in for the platform keystore; no key
//! material is compiled in.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const FIELD_KEY_INFO: &[u8] = b"reqsync-field-key-v1";

/// AES-256 key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Derives the field key from high-entropy secret material with
    /// HKDF-SHA256.
    ///
    /// # Errors
    ///
    /// Fails if HKDF rejects the output length.
    pub fn derive(secret: &[u8], salt: &[u8]) -> CoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), secret);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(FIELD_KEY_INFO, &mut bytes)
            .map_err(|_| CoreError::key_unavailable("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Source of the field encryption key.
pub trait KeyProvider: Send + Sync {
    /// Returns the key used for field encryption.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyUnavailable`] if the keystore cannot supply it.
    fn field_key(&self) -> CoreResult<EncryptionKey>;
}

/// Provider holding a key in memory. Intended for tests and for hosts that
/// already unwrapped the key themselves.
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    key: EncryptionKey,
}

impl StaticKeyProvider {
    /// Wraps `key`.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }
}

impl KeyProvider for StaticKeyProvider {
    fn field_key(&self) -> CoreResult<EncryptionKey> {
        Ok(self.key.clone())
    }
}

/// Provider deriving the key from keystore secret material and a per-install
/// salt.
pub struct SecretKeyProvider {
    secret: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
}

impl SecretKeyProvider {
    /// Creates a provider from secret material.
    #[must_use]
    pub fn new(secret: Vec<u8>, salt: Vec<u8>) -> Self {
        Self {
            secret: Zeroizing::new(secret),
            salt,
        }
    }
}

impl KeyProvider for SecretKeyProvider {
    fn field_key(&self) -> CoreResult<EncryptionKey> {
        if self.secret.is_empty() {
            return Err(CoreError::key_unavailable("empty secret"));
        }
        EncryptionKey::derive(&self.secret, &self.salt)
    }
}

impl fmt::Debug for SecretKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyProvider")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Seals and opens individual record fields.
///
/// Output layout is `nonce || ciphertext || tag`. The field name is bound as
/// associated data, so a value cannot be replayed into another field.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Creates a cipher for `key`.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Creates a cipher with the key of `provider`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error.
    pub fn from_provider(provider: &dyn KeyProvider) -> CoreResult<Self> {
        Ok(Self::new(&provider.field_key()?))
    }

    /// Encrypts `plaintext` for `field`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EncryptionFailed`] if the AEAD rejects the input.
    pub fn seal(&self, field: &str, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let payload = Payload {
            msg: plaintext,
            aad: field.as_bytes(),
        };
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), payload)
            .map_err(|_| CoreError::encryption_failed(format!("sealing {field}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend(ciphertext);
        Ok(out)
    }

    /// Decrypts a value sealed for `field`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecryptionFailed`] for short input, a wrong key,
    /// a different field name or tampered data.
    pub fn open(&self, field: &str, sealed: &[u8]) -> CoreResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::decryption_failed("ciphertext too short"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let payload = Payload {
            msg: ciphertext,
            aad: field.as_bytes(),
        };
        self.cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| CoreError::decryption_failed(format!("opening {field}")))
    }

    /// Encrypts a string field.
    ///
    /// # Errors
    ///
    /// See [`FieldCipher::seal`].
    pub fn seal_text(&self, field: &str, plaintext: &str) -> CoreResult<Vec<u8>> {
        self.seal(field, plaintext.as_bytes())
    }

    /// Decrypts a string field.
    ///
    /// # Errors
    ///
    /// See [`FieldCipher::open`]; also fails if the plaintext is not UTF-8.
    pub fn open_text(&self, field: &str, sealed: &[u8]) -> CoreResult<String> {
        String::from_utf8(self.open(field, sealed)?)
            .map_err(|_| CoreError::decryption_failed(format!("{field} is not UTF-8")))
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
