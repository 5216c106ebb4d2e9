//! Core abstractions for keyvault: the asymmetric key store contract and its record model.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod keys;
pub mod store;
