use std::path::PathBuf;

use color_eyre::Result;
use dirs::data_dir;
use keyvault_crypto::{jwk::SigningKeyManager, keyed_cipher::KeyedCipher};
use keyvault_storage::file_key_store::FileKeyStore;
use tracing::debug;

use crate::config::Config;

/// Resolve the default data directory for keyvault.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("keyvault"))
}

/// File-backed key store honoring the `data_dir` override.
pub fn key_store_from_config(config: &Config) -> Result<FileKeyStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "opening signing key store");
    Ok(FileKeyStore::in_dir(root))
}

pub fn cipher_from_config(config: &Config) -> Result<KeyedCipher> {
    Ok(KeyedCipher::new(&config.secrets)?)
}

/// Signing key manager over the configured store; generates missing keys.
pub async fn manager_from_config(config: &Config) -> Result<SigningKeyManager<FileKeyStore>> {
    let cipher = cipher_from_config(config)?;
    let store = key_store_from_config(config)?;
    let manager = SigningKeyManager::new(cipher, &config.signing_key_configs(), store).await?;
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use keyvault_core::keys::SigningKeyConfig;

    use super::*;

    fn test_config(root: &std::path::Path) -> Config {
        Config {
            secrets: vec!["superSecureAndRandomlyCreatedKey".into()],
            data_dir: Some(root.to_path_buf()),
            signing_keys: Some(vec![SigningKeyConfig::eddsa()]),
        }
    }

    #[tokio::test]
    async fn manager_uses_data_dir_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = manager_from_config(&test_config(dir.path()))
            .await
            .expect("manager");

        assert_eq!(manager.store().path(), dir.path().join("signing-keys.json"));
        assert!(manager.store().path().exists());
    }

    #[test]
    fn cipher_rejects_missing_secrets() {
        assert!(cipher_from_config(&Config::default()).is_err());
    }
}
