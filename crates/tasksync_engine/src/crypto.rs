//! Payload encryption.
//!
//! The engine only ever sees a [`CryptoProvider`]; the passphrase and raw
//! key material stay with whoever builds the provider.

use crate::error::{SyncError, SyncResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Ciphertext plus the nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
    /// Nonce used for this message.
    pub nonce: Vec<u8>,
}

/// Encrypts, decrypts and fingerprints task payloads.
pub trait CryptoProvider: Send + Sync {
    /// Encrypts `plaintext` under a fresh nonce.
    fn encrypt(&self, plaintext: &[u8]) -> SyncResult<EncryptedPayload>;

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> SyncResult<Vec<u8>>;

    /// Returns a checksum of `plaintext`.
    fn hash(&self, plaintext: &[u8]) -> String;
}

/// Encryption key for AES-256-GCM.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
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
    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(SyncError::Crypto(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a high-entropy secret using HKDF-SHA256.
    ///
    /// HKDF is not a password hash. The secret must already carry enough
    /// entropy, e.g. a generated passphrase.
    pub fn derive(secret: &[u8], salt: &[u8]) -> SyncResult<Self> {
        use hkdf::Hkdf;

        let hk = Hkdf::<Sha256>::new(Some(salt), secret);

        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"tasksync-payload-key-v1", &mut bytes)
            .map_err(|_| SyncError::Crypto("HKDF expand failed".into()))?;

        Ok(Self { bytes })
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// AES-256-GCM provider with SHA-256 checksums.
pub struct AesGcmCrypto {
    cipher: Aes256Gcm,
}

impl AesGcmCrypto {
    /// Creates a provider with the given key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Derives the key from `secret` and `salt`, then creates a provider.
    pub fn from_secret(secret: &[u8], salt: &[u8]) -> SyncResult<Self> {
        Ok(Self::new(EncryptionKey::derive(secret, salt)?))
    }
}

impl std::fmt::Debug for AesGcmCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCrypto").finish_non_exhaustive()
    }
}

impl CryptoProvider for AesGcmCrypto {
    fn encrypt(&self, plaintext: &[u8]) -> SyncResult<EncryptedPayload> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| SyncError::Crypto("encryption error".into()))?;

        Ok(EncryptedPayload {
            ciphertext,
            nonce: nonce_bytes.to_vec(),
        })
    }

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> SyncResult<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(SyncError::Crypto(format!(
                "invalid nonce size: expected {NONCE_SIZE}, got {}",
                nonce.len()
            )));
        }

        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SyncError::Crypto("decryption error".into()))
    }

    fn hash(&self, plaintext: &[u8]) -> String {
        Sha256::digest(plaintext)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Encodes binary data for the wire.
pub fn encode_blob(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a wire blob.
pub fn decode_blob(blob: &str) -> SyncResult<Vec<u8>> {
    STANDARD
        .decode(blob)
        .map_err(|e| SyncError::Crypto(format!("invalid base64: {e}")))
}
