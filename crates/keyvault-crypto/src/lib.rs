//! Secret-management primitives: a rotation-aware AES-GCM cipher for secrets at rest
//! and a manager for the RS256 and EdDSA keys that sign and verify bearer tokens.

pub mod jwk;
pub mod keyed_cipher;
pub mod random;
pub mod token;
