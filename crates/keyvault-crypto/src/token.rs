//! Compact JWS tokens signed with the manager's keys.
//!
//! Only the signature is checked here; claim semantics such as expiry belong to the caller.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use keyvault_core::keys::SigningAlgorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::jwk::{Jwks, SigningKeyHandle};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("signature does not match any published key")]
    SignatureMismatch,
    #[error("claims serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

/// Sign `claims` as `header.payload.signature`.
pub fn sign<T: Serialize>(key: &SigningKeyHandle, claims: &T) -> Result<String, TokenError> {
    let header = Header {
        alg: key.algorithm().as_str().to_string(),
        typ: Some("JWT".into()),
        kid: Some(key.kid().to_string()),
    };
    let header = serde_json::to_vec(&header).map_err(serialization_err)?;
    let payload = serde_json::to_vec(claims).map_err(serialization_err)?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify `token` against the published keys and return its claims.
///
/// A `kid` found in the set selects that key; otherwise every key is tried. Only
/// keys published for the header's `alg` are considered.
pub fn verify(token: &str, keys: &Jwks) -> Result<serde_json::Value, TokenError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed("expected three segments".into()));
    };

    let header: Header = serde_json::from_slice(&decode_segment(header_b64, "header")?)
        .map_err(|e| TokenError::Malformed(format!("header: {e}")))?;
    let Some(algorithm) = SigningAlgorithm::from_jose(&header.alg) else {
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    };

    let signature = decode_segment(signature_b64, "signature")?;
    let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];

    let candidates: Vec<_> = match header.kid.as_deref().and_then(|kid| keys.find(kid)) {
        Some(key) => vec![key],
        None => keys.keys.iter().collect(),
    };
    for jwk in candidates.into_iter().filter(|jwk| jwk.alg == algorithm.as_str()) {
        let verifying = match jwk.verification_key() {
            Ok(verifying) if verifying.algorithm() == algorithm => verifying,
            Ok(_) => continue,
            Err(err) => {
                debug!(kid = %jwk.kid, %err, "skipping unusable key");
                continue;
            }
        };
        if verifying.verify(signing_input.as_bytes(), &signature) {
            let payload = decode_segment(payload_b64, "payload")?;
            return serde_json::from_slice(&payload)
                .map_err(|e| TokenError::Malformed(format!("payload: {e}")));
        }
    }
    Err(TokenError::SignatureMismatch)
}

fn serialization_err(err: serde_json::Error) -> TokenError {
    TokenError::Serialization(err.to_string())
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{name}: {e}")))
}
