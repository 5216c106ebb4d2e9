use std::sync::Arc;

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("randomness unavailable: {reason}")]
pub struct RandomError {
    pub reason: String,
}

/// Source of cryptographic randomness for nonces and key seeds.
///
/// Must be safe to call from many threads at once.
pub trait RandomSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomError>;
}

/// Operating-system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomError> {
        OsRng.try_fill_bytes(dest).map_err(|err| RandomError {
            reason: err.to_string(),
        })
    }
}

/// Shared default source.
pub fn os_random() -> Arc<dyn RandomSource> {
    Arc::new(OsRandom)
}
