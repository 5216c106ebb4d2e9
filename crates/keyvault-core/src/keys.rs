use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Modulus size used for RSA keys when the config does not name one.
pub const DEFAULT_RSA_KEY_SIZE: u32 = 2048;

/// Asymmetric signature algorithms a signing key can be generated for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256 (JOSE `RS256`).
    #[default]
    #[serde(rename = "RS256")]
    Rs256,
    /// Ed25519 signatures (JOSE `EdDSA`).
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl SigningAlgorithm {
    /// JOSE `alg` header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::Rs256 => "RS256",
            SigningAlgorithm::EdDsa => "EdDSA",
        }
    }

    pub fn from_jose(alg: &str) -> Option<Self> {
        match alg {
            "RS256" => Some(SigningAlgorithm::Rs256),
            "EdDSA" => Some(SigningAlgorithm::EdDsa),
            _ => None,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation parameters for one required signing key slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningKeyConfig {
    pub algorithm: SigningAlgorithm,
    /// RSA modulus size in bits; not applicable to EdDSA.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
}

impl SigningKeyConfig {
    pub fn new(algorithm: SigningAlgorithm) -> Self {
        Self {
            algorithm,
            key_size: None,
        }
    }

    pub fn rs256(key_size: u32) -> Self {
        Self {
            algorithm: SigningAlgorithm::Rs256,
            key_size: Some(key_size),
        }
    }

    pub fn eddsa() -> Self {
        Self::new(SigningAlgorithm::EdDsa)
    }

    /// Key size a record generated from this config carries.
    pub fn effective_key_size(&self) -> Option<u32> {
        match self.algorithm {
            SigningAlgorithm::Rs256 => Some(self.key_size.unwrap_or(DEFAULT_RSA_KEY_SIZE)),
            SigningAlgorithm::EdDsa => self.key_size,
        }
    }

    /// Whether `record` was generated with these parameters.
    pub fn matches(&self, record: &KeyRecord) -> bool {
        record.algorithm == self.algorithm && record.key_size == self.effective_key_size()
    }
}

impl fmt::Display for SigningKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.effective_key_size() {
            Some(bits) => write!(f, "{}/{bits}", self.algorithm),
            None => write!(f, "{}", self.algorithm),
        }
    }
}

/// A persisted asymmetric key. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRecord {
    /// Store-assigned id; higher ids were created later.
    pub id: u64,
    pub algorithm: SigningAlgorithm,
    /// RSA modulus size in bits; `None` for EdDSA.
    #[serde(default)]
    pub key_size: Option<u32>,
    /// Encrypted envelope of the private key material.
    pub key_data: String,
    /// Encoded public key (PKCS#1 DER for RSA, raw 32 bytes for Ed25519).
    pub public_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl KeyRecord {
    /// Parameters this record was generated with.
    pub fn config(&self) -> SigningKeyConfig {
        SigningKeyConfig {
            algorithm: self.algorithm,
            key_size: self.key_size,
        }
    }
}

/// Record contents handed to the store before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewKeyRecord {
    pub algorithm: SigningAlgorithm,
    pub key_size: Option<u32>,
    pub key_data: String,
    pub public_key: Vec<u8>,
}

impl NewKeyRecord {
    /// Stamp the record with its store-assigned id and creation time.
    pub fn into_record(self, id: u64) -> KeyRecord {
        KeyRecord {
            id,
            algorithm: self.algorithm,
            key_size: self.key_size,
            key_data: self.key_data,
            public_key: self.public_key,
            created_at: Utc::now(),
        }
    }
}
