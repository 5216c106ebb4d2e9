//! Signing key lifecycle: generation, encrypted persistence, and publication as a JWKS.

pub mod key;
pub mod manager;

pub use key::{Jwk, Jwks, SigningKeyHandle, VerificationKey, MIN_RSA_KEY_SIZE};
pub use manager::SigningKeyManager;

use keyvault_core::store::KeyStoreError;
use thiserror::Error;

use crate::{keyed_cipher::CipherError, random::RandomError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningKeyError {
    /// Private key material could not be sealed or opened.
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("key generation failed: {reason}")]
    Generation { reason: String },
    /// Store failure, passed through unchanged.
    #[error(transparent)]
    Persistence(#[from] KeyStoreError),
    #[error("no signing key has been created")]
    EmptyStore,
    #[error("invalid key material for key {kid}: {reason}")]
    InvalidKey { kid: String, reason: String },
    #[error("unusable signing key config {config}: {reason}")]
    InvalidConfig { config: String, reason: String },
    /// An existing record occupies a slot but was generated with other parameters.
    #[error("signing key {id} is {found}, but its slot requires {expected}")]
    ConfigMismatch {
        id: u64,
        expected: String,
        found: String,
    },
}

impl From<RandomError> for SigningKeyError {
    fn from(err: RandomError) -> Self {
        SigningKeyError::Generation { reason: err.reason }
    }
}
