use std::sync::Arc;

use keyvault_core::{
    keys::{KeyRecord, NewKeyRecord, SigningKeyConfig},
    store::{AsymmetricKeyStore, KeyStoreError},
};
use tracing::{debug, info, instrument};

use super::{key, Jwk, Jwks, SigningKeyError, SigningKeyHandle};
use crate::{
    keyed_cipher::KeyedCipher,
    random::{os_random, RandomSource},
};

/// Owns the signing keys of a deployment.
///
/// Required configs are matched by position against the stored records, oldest
/// first: config `i` is satisfied by the `i`-th record, whatever its id, as long as
/// that record was generated with the same algorithm and key size. Only slots past
/// the end of the store are generated, so records removed from the front by a
/// retention policy never cause new keys to be minted. A record that disagrees with
/// its slot fails construction with [`SigningKeyError::ConfigMismatch`].
///
/// Private keys are sealed with the keyed cipher before they reach the store.
/// Signing uses the newest record, while the published key set covers every record
/// still in the store.
pub struct SigningKeyManager<S: AsymmetricKeyStore> {
    cipher: KeyedCipher,
    store: S,
    random: Arc<dyn RandomSource>,
}

impl<S: AsymmetricKeyStore> SigningKeyManager<S> {
    /// One key per configured secret with the default parameters (RS256, 2048 bits),
    /// sealed with a cipher over those secrets.
    pub async fn from_secrets<T: AsRef<str>>(
        secrets: &[T],
        store: S,
    ) -> Result<Self, SigningKeyError> {
        let cipher = KeyedCipher::new(secrets)?;
        let configs = vec![SigningKeyConfig::default(); secrets.len()];
        Self::new(cipher, &configs, store).await
    }

    pub async fn new(
        cipher: KeyedCipher,
        configs: &[SigningKeyConfig],
        store: S,
    ) -> Result<Self, SigningKeyError> {
        Self::with_random(cipher, configs, store, os_random()).await
    }

    pub async fn with_random(
        cipher: KeyedCipher,
        configs: &[SigningKeyConfig],
        store: S,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, SigningKeyError> {
        let manager = Self {
            cipher,
            store,
            random,
        };
        manager.ensure_keys(configs).await?;
        Ok(manager)
    }

    #[instrument(skip_all, fields(required = configs.len()))]
    async fn ensure_keys(&self, configs: &[SigningKeyConfig]) -> Result<(), SigningKeyError> {
        configs.iter().try_for_each(key::validate)?;

        let mut existing = self.store.get_all().await?;
        existing.sort_by_key(|record| record.id);
        for (slot, config) in configs.iter().enumerate() {
            match existing.get(slot) {
                Some(record) if config.matches(record) => {
                    debug!(slot, id = record.id, "signing key present");
                }
                Some(record) => {
                    return Err(SigningKeyError::ConfigMismatch {
                        id: record.id,
                        expected: config.to_string(),
                        found: record.config().to_string(),
                    });
                }
                None => {
                    self.generate_key(config).await?;
                }
            }
        }
        Ok(())
    }

    /// Generate a key pair for `config` and persist it as the newest record.
    #[instrument(skip_all, fields(config = %config))]
    pub async fn generate_key(
        &self,
        config: &SigningKeyConfig,
    ) -> Result<KeyRecord, SigningKeyError> {
        let generated = key::generate(config, self.random.as_ref())?;
        let key_data = self.cipher.encrypt(&generated.private_key)?;

        let record = self
            .store
            .create(NewKeyRecord {
                algorithm: config.algorithm,
                key_size: config.effective_key_size(),
                key_data,
                public_key: generated.public_key.clone(),
            })
            .await?;
        info!(kid = record.id, "generated signing key");
        Ok(record)
    }

    /// Private key of the newest record.
    #[instrument(skip_all)]
    pub async fn get_signing_key(&self) -> Result<SigningKeyHandle, SigningKeyError> {
        let record = self.store.get_last().await.map_err(|err| match err {
            KeyStoreError::Empty => SigningKeyError::EmptyStore,
            other => SigningKeyError::Persistence(other),
        })?;
        self.open(&record)
    }

    /// Public keys of every record, oldest first.
    #[instrument(skip_all)]
    pub async fn get_public_keys(&self) -> Result<Jwks, SigningKeyError> {
        let keys = self
            .store
            .get_all()
            .await?
            .iter()
            .map(Jwk::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Jwks { keys })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn open(&self, record: &KeyRecord) -> Result<SigningKeyHandle, SigningKeyError> {
        let mut private_key = self.cipher.decrypt(&record.key_data)?;
        let kid = record.id.to_string();
        let handle = SigningKeyHandle::from_private_key(kid, record.algorithm, &private_key);
        private_key.fill(0);
        let handle = handle?;
        if handle.public_jwk() != Jwk::from_record(record)? {
            return Err(SigningKeyError::InvalidKey {
                kid: handle.kid().to_string(),
                reason: "private key does not match stored public key".into(),
            });
        }
        Ok(handle)
    }
}
