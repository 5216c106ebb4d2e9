use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use keyvault_core::keys::{KeyRecord, SigningAlgorithm, SigningKeyConfig};
use rand::{rngs::StdRng, SeedableRng};
use rsa::{
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey},
    pkcs1v15,
    signature::SignatureEncoding,
    traits::PublicKeyParts,
    BigUint, RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::SigningKeyError;
use crate::random::RandomSource;

/// Smallest RSA modulus accepted for new keys.
pub const MIN_RSA_KEY_SIZE: u32 = 2048;

#[derive(Clone)]
enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// Private signing key of one persisted record. The `kid` is the record id.
#[derive(Clone)]
pub struct SigningKeyHandle {
    kid: String,
    algorithm: SigningAlgorithm,
    key: PrivateKey,
}

impl SigningKeyHandle {
    /// Decode private key material as produced by key generation: PKCS#1 DER for
    /// RS256, the 32-byte seed for EdDSA.
    pub(crate) fn from_private_key(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        encoded: &[u8],
    ) -> Result<Self, SigningKeyError> {
        let kid = kid.into();
        let key = match algorithm {
            SigningAlgorithm::Rs256 => {
                let key = <RsaPrivateKey as DecodeRsaPrivateKey>::from_pkcs1_der(encoded)
                    .map_err(|e| SigningKeyError::InvalidKey {
                        kid: kid.clone(),
                        reason: e.to_string(),
                    })?;
                PrivateKey::Rsa(key)
            }
            SigningAlgorithm::EdDsa => {
                let seed: [u8; SECRET_KEY_LENGTH] =
                    encoded.try_into().map_err(|_| SigningKeyError::InvalidKey {
                        kid: kid.clone(),
                        reason: format!(
                            "expected {SECRET_KEY_LENGTH} byte seed, got {}",
                            encoded.len()
                        ),
                    })?;
                PrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed))
            }
        };
        Ok(Self {
            kid,
            algorithm,
            key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            PrivateKey::Rsa(key) => {
                let signer = pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                rsa::signature::Signer::sign(&signer, message).to_vec()
            }
            PrivateKey::Ed25519(key) => ed25519_dalek::Signer::sign(key, message)
                .to_bytes()
                .to_vec(),
        }
    }

    /// Public half as a JWK.
    pub fn public_jwk(&self) -> Jwk {
        match &self.key {
            PrivateKey::Rsa(key) => Jwk::rsa(self.kid.clone(), &key.to_public_key()),
            PrivateKey::Ed25519(key) => {
                Jwk::ed25519(self.kid.clone(), &key.verifying_key().to_bytes())
            }
        }
    }
}

impl fmt::Debug for SigningKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyHandle")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Freshly generated key pair, before the private half is sealed.
pub(crate) struct GeneratedKey {
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl Drop for GeneratedKey {
    fn drop(&mut self) {
        self.private_key.fill(0);
    }
}

/// Reject parameters no key can be generated for.
pub(crate) fn validate(config: &SigningKeyConfig) -> Result<(), SigningKeyError> {
    let reason = match (config.algorithm, config.effective_key_size()) {
        (SigningAlgorithm::Rs256, Some(bits)) if bits < MIN_RSA_KEY_SIZE => {
            format!("RSA keys need at least {MIN_RSA_KEY_SIZE} bits")
        }
        (SigningAlgorithm::EdDsa, Some(_)) => "EdDSA keys take no key size".to_string(),
        _ => return Ok(()),
    };
    Err(SigningKeyError::InvalidConfig {
        config: config.to_string(),
        reason,
    })
}

/// Generate a key pair for `config`, drawing all entropy from `random`.
pub(crate) fn generate(
    config: &SigningKeyConfig,
    random: &dyn RandomSource,
) -> Result<GeneratedKey, SigningKeyError> {
    validate(config)?;
    let mut seed = [0u8; SECRET_KEY_LENGTH];
    match config.algorithm {
        SigningAlgorithm::Rs256 => {
            let bits = config.effective_key_size().unwrap_or(MIN_RSA_KEY_SIZE);
            random.fill(&mut seed)?;
            let mut rng = StdRng::from_seed(seed);
            seed.fill(0);

            let private = RsaPrivateKey::new(&mut rng, bits as usize).map_err(generation_err)?;
            let private_key = EncodeRsaPrivateKey::to_pkcs1_der(&private)
                .map_err(generation_err)?
                .as_bytes()
                .to_vec();
            let public_key = EncodeRsaPublicKey::to_pkcs1_der(&private.to_public_key())
                .map_err(generation_err)?
                .as_bytes()
                .to_vec();
            Ok(GeneratedKey {
                private_key,
                public_key,
            })
        }
        SigningAlgorithm::EdDsa => {
            random.fill(&mut seed)?;
            let signing = ed25519_dalek::SigningKey::from_bytes(&seed);
            let generated = GeneratedKey {
                private_key: seed.to_vec(),
                public_key: signing.verifying_key().to_bytes().to_vec(),
            };
            seed.fill(0);
            Ok(generated)
        }
    }
}

fn generation_err<E: ToString>(err: E) -> SigningKeyError {
    SigningKeyError::Generation {
        reason: err.to_string(),
    }
}

/// Public verification key in JWK form: RFC 7518 `RSA` or RFC 8037 `OKP`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
}

impl Jwk {
    pub fn rsa(kid: impl Into<String>, public_key: &RsaPublicKey) -> Self {
        Self {
            kty: "RSA".into(),
            alg: SigningAlgorithm::Rs256.as_str().into(),
            key_use: "sig".into(),
            kid: kid.into(),
            n: Some(URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be())),
            e: Some(URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be())),
            crv: None,
            x: None,
        }
    }

    pub fn ed25519(kid: impl Into<String>, public_key: &[u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self {
            kty: "OKP".into(),
            alg: SigningAlgorithm::EdDsa.as_str().into(),
            key_use: "sig".into(),
            kid: kid.into(),
            n: None,
            e: None,
            crv: Some("Ed25519".into()),
            x: Some(URL_SAFE_NO_PAD.encode(public_key)),
        }
    }

    pub fn from_record(record: &KeyRecord) -> Result<Self, SigningKeyError> {
        let kid = record.id.to_string();
        let invalid = |reason: String| SigningKeyError::InvalidKey {
            kid: kid.clone(),
            reason,
        };
        match record.algorithm {
            SigningAlgorithm::Rs256 => {
                let public = <RsaPublicKey as DecodeRsaPublicKey>::from_pkcs1_der(
                    &record.public_key,
                )
                .map_err(|e| invalid(e.to_string()))?;
                Ok(Self::rsa(kid.clone(), &public))
            }
            SigningAlgorithm::EdDsa => {
                let public: [u8; PUBLIC_KEY_LENGTH] =
                    record.public_key.as_slice().try_into().map_err(|_| {
                        invalid(format!(
                            "expected {PUBLIC_KEY_LENGTH} byte public key, got {}",
                            record.public_key.len()
                        ))
                    })?;
                Ok(Self::ed25519(kid.clone(), &public))
            }
        }
    }

    /// Decode the key parameters into something that can check signatures.
    pub fn verification_key(&self) -> Result<VerificationKey, SigningKeyError> {
        let invalid = |reason: String| SigningKeyError::InvalidKey {
            kid: self.kid.clone(),
            reason,
        };
        let member = |name: &str, value: &Option<String>| -> Result<Vec<u8>, SigningKeyError> {
            let value = value
                .as_deref()
                .ok_or_else(|| invalid(format!("missing `{name}`")))?;
            URL_SAFE_NO_PAD
                .decode(value)
                .map_err(|e| invalid(format!("`{name}`: {e}")))
        };

        match (self.kty.as_str(), self.crv.as_deref()) {
            ("RSA", _) => {
                let n = BigUint::from_bytes_be(&member("n", &self.n)?);
                let e = BigUint::from_bytes_be(&member("e", &self.e)?);
                let public = RsaPublicKey::new(n, e).map_err(|e| invalid(e.to_string()))?;
                Ok(VerificationKey::Rs256(pkcs1v15::VerifyingKey::new(public)))
            }
            ("OKP", Some("Ed25519")) => {
                let bytes = member("x", &self.x)?;
                let bytes: [u8; PUBLIC_KEY_LENGTH] =
                    bytes.as_slice().try_into().map_err(|_| {
                        invalid(format!("expected {PUBLIC_KEY_LENGTH} bytes, got {}", bytes.len()))
                    })?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| invalid(e.to_string()))?;
                Ok(VerificationKey::EdDsa(key))
            }
            (kty, crv) => Err(invalid(format!(
                "unsupported key type {kty}/{}",
                crv.unwrap_or("-")
            ))),
        }
    }
}

/// Decoded public key of one JWK.
#[derive(Debug, Clone)]
pub enum VerificationKey {
    Rs256(pkcs1v15::VerifyingKey<Sha256>),
    EdDsa(ed25519_dalek::VerifyingKey),
}

impl VerificationKey {
    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            VerificationKey::Rs256(_) => SigningAlgorithm::Rs256,
            VerificationKey::EdDsa(_) => SigningAlgorithm::EdDsa,
        }
    }

    /// Whether `signature` is valid for `message` under this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            VerificationKey::Rs256(key) => pkcs1v15::Signature::try_from(signature)
                .map(|sig| rsa::signature::Verifier::verify(key, message, &sig).is_ok())
                .unwrap_or(false),
            VerificationKey::EdDsa(key) => ed25519_dalek::Signature::from_slice(signature)
                .map(|sig| ed25519_dalek::Verifier::verify(key, message, &sig).is_ok())
                .unwrap_or(false),
        }
    }
}

/// Published verification key set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::random::{testing::FailingRandom, OsRandom};

    fn eddsa_handle(kid: &str, seed: u8) -> SigningKeyHandle {
        SigningKeyHandle::from_private_key(kid, SigningAlgorithm::EdDsa, &[seed; 32])
            .expect("handle")
    }

    fn record(id: u64, config: &SigningKeyConfig, generated: &GeneratedKey) -> KeyRecord {
        KeyRecord {
            id,
            algorithm: config.algorithm,
            key_size: config.effective_key_size(),
            key_data: String::new(),
            public_key: generated.public_key.clone(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_short_seed() {
        let err = SigningKeyHandle::from_private_key("1", SigningAlgorithm::EdDsa, &[0u8; 16])
            .expect_err("short seed");
        assert!(matches!(err, SigningKeyError::InvalidKey { .. }));
    }

    #[test]
    fn rejects_garbage_rsa_key() {
        let err = SigningKeyHandle::from_private_key("1", SigningAlgorithm::Rs256, b"not der")
            .expect_err("garbage");
        assert!(matches!(err, SigningKeyError::InvalidKey { .. }));
    }

    #[test]
    fn eddsa_jwk_round_trips_to_verification_key() {
        let handle = eddsa_handle("3", 7);
        let jwk = handle.public_jwk();

        assert_eq!(jwk.kid, "3");
        assert_eq!(jwk.kty, "OKP");
        let key = jwk.verification_key().expect("verification key");
        assert_eq!(key.algorithm(), SigningAlgorithm::EdDsa);
        assert!(key.verify(b"hello", &handle.sign(b"hello")));
        assert!(!key.verify(b"hello!", &handle.sign(b"hello")));
    }

    #[test]
    fn rsa_key_generates_signs_and_publishes() {
        let config = SigningKeyConfig::rs256(MIN_RSA_KEY_SIZE);
        let generated = generate(&config, &OsRandom).expect("generate");
        let handle =
            SigningKeyHandle::from_private_key("4", SigningAlgorithm::Rs256, &generated.private_key)
                .expect("handle");

        let jwk = handle.public_jwk();
        assert_eq!(jwk, Jwk::from_record(&record(4, &config, &generated)).expect("jwk"));
        let json = serde_json::to_value(&jwk).expect("json");
        assert_eq!(json["kty"], "RSA");
        assert_eq!(json["alg"], "RS256");
        assert_eq!(json["e"], "AQAB");
        assert!(json.get("x").is_none());

        let key = jwk.verification_key().expect("verification key");
        let signature = handle.sign(b"payload");
        assert_eq!(signature.len(), MIN_RSA_KEY_SIZE as usize / 8);
        assert!(key.verify(b"payload", &signature));
        assert!(!key.verify(b"tampered", &signature));
    }

    #[test]
    fn generate_validates_parameters() {
        let err = generate(&SigningKeyConfig::rs256(1024), &OsRandom).err();
        assert!(matches!(err, Some(SigningKeyError::InvalidConfig { .. })));

        let sized_eddsa = SigningKeyConfig {
            key_size: Some(256),
            ..SigningKeyConfig::eddsa()
        };
        let err = generate(&sized_eddsa, &OsRandom).err();
        assert!(matches!(err, Some(SigningKeyError::InvalidConfig { .. })));
    }

    #[test]
    fn generate_surfaces_randomness_failure() {
        for config in [SigningKeyConfig::default(), SigningKeyConfig::eddsa()] {
            let err = generate(&config, &FailingRandom).err();
            assert!(matches!(err, Some(SigningKeyError::Generation { .. })), "{config}");
        }
    }

    #[test]
    fn eddsa_jwk_serializes_with_standard_member_names() {
        let json = serde_json::to_value(eddsa_handle("1", 1).public_jwk()).expect("json");
        assert_eq!(json["use"], "sig");
        assert_eq!(json["crv"], "Ed25519");
        assert_eq!(json["alg"], "EdDSA");
        assert!(json.get("key_use").is_none());
        assert!(json.get("n").is_none());
    }

    #[test]
    fn from_record_rejects_bad_public_key() {
        let generated = GeneratedKey {
            private_key: Vec::new(),
            public_key: vec![1, 2, 3],
        };
        for config in [SigningKeyConfig::default(), SigningKeyConfig::eddsa()] {
            let err = Jwk::from_record(&record(9, &config, &generated)).expect_err("bad key");
            assert!(matches!(err, SigningKeyError::InvalidKey { kid, .. } if kid == "9"));
        }
    }

    #[test]
    fn unknown_key_type_is_rejected() {
        let mut jwk = eddsa_handle("1", 1).public_jwk();
        jwk.kty = "EC".into();
        assert!(matches!(
            jwk.verification_key(),
            Err(SigningKeyError::InvalidKey { .. })
        ));
    }

    #[test]
    fn jwks_find_by_kid() {
        let set = Jwks {
            keys: vec![eddsa_handle("1", 1).public_jwk(), eddsa_handle("2", 2).public_jwk()],
        };
        assert_eq!(set.len(), 2);
        assert_eq!(set.find("2").map(|k| k.kid.as_str()), Some("2"));
        assert!(set.find("3").is_none());
    }

    #[test]
    fn debug_hides_private_key() {
        let rendered = format!("{:?}", eddsa_handle("5", 5));
        assert!(rendered.contains("kid"));
        assert!(!rendered.contains("key:"));
    }
}
