use std::{fmt, sync::Arc};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::random::{os_random, RandomError, RandomSource};

/// Length of configured secrets and of the derived AES-256 key.
pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SECRET_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Key list rejected at construction time.
    #[error("invalid key configuration: {0}")]
    Configuration(String),
    /// Input could not be parsed as an envelope.
    #[error("malformed envelope: {0}")]
    Encoding(String),
    /// No key in the ring authenticated the envelope.
    #[error("envelope failed authentication against every key in the ring")]
    Authentication,
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error(transparent)]
    Randomness(#[from] RandomError),
}

/// Exactly 32 bytes of secret key material.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CipherError::Configuration(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Derive key material from a configured secret: the secret must be exactly
    /// 32 bytes, and the AES key is its SHA-256 digest.
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        if secret.len() != KEY_LEN {
            return Err(CipherError::Configuration(format!(
                "expected {KEY_LEN} bytes, got {}",
                secret.len()
            )));
        }
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        Ok(Self(key))
    }

    fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Ordered, non-empty, immutable list of keys. The first key is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRing {
    keys: Vec<SymmetricKey>,
}

impl KeyRing {
    pub fn new(keys: Vec<SymmetricKey>) -> Result<Self, CipherError> {
        if keys.is_empty() {
            return Err(CipherError::Configuration(
                "at least one key is required".into(),
            ));
        }
        Ok(Self { keys })
    }

    /// Build a ring from configured secrets. A single bad entry rejects the whole list.
    pub fn from_secrets<S: AsRef<str>>(secrets: &[S]) -> Result<Self, CipherError> {
        let keys = secrets
            .iter()
            .enumerate()
            .map(|(index, secret)| {
                SymmetricKey::from_secret(secret.as_ref()).map_err(|err| match err {
                    CipherError::Configuration(reason) => {
                        CipherError::Configuration(format!("key {index}: {reason}"))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(keys)
    }

    /// Key used for new encryptions.
    pub fn active(&self) -> &SymmetricKey {
        &self.keys[0]
    }

    pub fn keys(&self) -> &[SymmetricKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// New ring with `key` active and every current key kept for decryption.
    pub fn rotate(&self, key: SymmetricKey) -> KeyRing {
        let mut keys = Vec::with_capacity(self.keys.len() + 1);
        keys.push(key);
        keys.extend(self.keys.iter().cloned());
        KeyRing { keys }
    }
}

/// AES-256-GCM over a key ring.
///
/// Envelopes are `base64(nonce || ciphertext || tag)`. Encryption always uses the
/// active key; decryption tries every key in ring order and returns the first
/// authenticated result. The ring never changes after construction, so the cipher
/// can be shared freely; rotate by building a new cipher and swapping it in.
pub struct KeyedCipher {
    ring: KeyRing,
    ciphers: Vec<Aes256Gcm>,
    random: Arc<dyn RandomSource>,
}

impl KeyedCipher {
    /// Build from configured secrets using the OS random source.
    pub fn new<S: AsRef<str>>(secrets: &[S]) -> Result<Self, CipherError> {
        Self::with_random(secrets, os_random())
    }

    pub fn with_random<S: AsRef<str>>(
        secrets: &[S],
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, CipherError> {
        Ok(Self::from_ring(KeyRing::from_secrets(secrets)?, random))
    }

    pub fn from_ring(ring: KeyRing, random: Arc<dyn RandomSource>) -> Self {
        let ciphers = ring
            .keys()
            .iter()
            .map(|key| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())))
            .collect();
        Self {
            ring,
            ciphers,
            random,
        }
    }

    pub fn ring(&self) -> &KeyRing {
        &self.ring
    }

    /// Seal `plaintext` under the active key with a fresh nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.random.fill(&mut nonce)?;

        let sealed = self.ciphers[0]
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&sealed);
        Ok(STANDARD.encode(envelope))
    }

    /// Open an envelope produced under any key in the ring.
    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>, CipherError> {
        let raw = STANDARD
            .decode(envelope)
            .map_err(|e| CipherError::Encoding(e.to_string()))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Encoding(format!(
                "envelope too short: {} bytes",
                raw.len()
            )));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);
        for (index, cipher) in self.ciphers.iter().enumerate() {
            if let Ok(plaintext) = cipher.decrypt(nonce, sealed) {
                if index > 0 {
                    debug!(key_index = index, "envelope opened with non-active key");
                }
                return Ok(plaintext);
            }
        }
        Err(CipherError::Authentication)
    }
}

impl fmt::Debug for KeyedCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCipher")
            .field("keys", &self.ring.len())
            .finish()
    }
}

/// Generate a printable secret suitable for the key list (32 URL-safe characters).
pub fn generate_secret(random: &dyn RandomSource) -> Result<String, RandomError> {
    let mut bytes = [0u8; KEY_LEN];
    random.fill(&mut bytes)?;
    Ok(bytes
        .iter()
        .map(|b| SECRET_ALPHABET[(b & 0x3f) as usize] as char)
        .collect())
}
