//! Durable `AsymmetricKeyStore` implementations.
//! Records are kept as JSON and replaced atomically on every write.

pub mod file_key_store;
