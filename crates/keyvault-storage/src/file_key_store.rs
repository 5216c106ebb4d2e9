use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use keyvault_core::{
    keys::{KeyRecord, NewKeyRecord},
    store::{AsymmetricKeyStore, KeyStoreError},
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// JSON file-backed key store. All records live in one document that is rewritten
/// through a temp file and renamed into place, so readers never see a partial write.
///
/// Creates are serialized within the process; running several writers against the
/// same file from different processes is not supported.
pub struct FileKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `<dir>/signing-keys.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join("signing-keys.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<KeyRecord>, KeyStoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_err(err)),
        };

        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(storage_err)?;
        if buf.is_empty() {
            return Ok(Vec::new());
        }
        let stored: StoredKeys = serde_json::from_slice(&buf).map_err(storage_err)?;
        Ok(stored.keys)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredKeys {
    keys: Vec<KeyRecord>,
}

#[async_trait]
impl AsymmetricKeyStore for FileKeyStore {
    #[instrument(skip(self))]
    async fn get(&self, id: u64) -> Result<Option<KeyRecord>, KeyStoreError> {
        Ok(self.load()?.into_iter().find(|record| record.id == id))
    }

    #[instrument(skip_all)]
    async fn get_all(&self) -> Result<Vec<KeyRecord>, KeyStoreError> {
        let mut records = self.load()?;
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    #[instrument(skip_all)]
    async fn get_last(&self) -> Result<KeyRecord, KeyStoreError> {
        self.load()?
            .into_iter()
            .max_by_key(|record| record.id)
            .ok_or(KeyStoreError::Empty)
    }

    #[instrument(skip_all, fields(algorithm = %record.algorithm))]
    async fn create(&self, record: NewKeyRecord) -> Result<KeyRecord, KeyStoreError> {
        let _guard = self.write_lock.lock().map_err(|err| KeyStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        let mut records = self.load()?;
        let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let record = record.into_record(id);
        records.push(record.clone());

        write_keys(&self.path, &StoredKeys { keys: records })?;
        debug!(id, path = ?self.path, "persisted key record");
        Ok(record)
    }
}

fn write_keys(path: &Path, stored: &StoredKeys) -> Result<(), KeyStoreError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec_pretty(stored).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn storage_err<E: ToString>(err: E) -> KeyStoreError {
    KeyStoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use keyvault_core::keys::SigningAlgorithm;
    use keyvault_crypto::{
        jwk::SigningKeyManager,
        keyed_cipher::generate_secret,
        random::OsRandom,
    };

    use super::*;

    fn new_record(tag: &str) -> NewKeyRecord {
        NewKeyRecord {
            algorithm: SigningAlgorithm::EdDsa,
            key_size: None,
            key_data: tag.to_string(),
            public_key: vec![7; 32],
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::in_dir(dir.path());

        assert!(store.get_all().await.expect("get_all").is_empty());
        assert!(store.get(1).await.expect("get").is_none());
        assert_eq!(store.get_last().await, Err(KeyStoreError::Empty));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::in_dir(dir.path().join("nested"));
        let first = store.create(new_record("a")).await.expect("create a");
        let second = store.create(new_record("b")).await.expect("create b");
        assert_eq!((first.id, second.id), (1, 2));

        let reopened = FileKeyStore::in_dir(dir.path().join("nested"));
        assert_eq!(reopened.get_all().await.expect("get_all"), vec![first.clone(), second.clone()]);
        assert_eq!(reopened.get(1).await.expect("get"), Some(first));
        assert_eq!(reopened.get_last().await.expect("get_last"), second);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyStore::in_dir(dir.path());
        fs::write(store.path(), b"{not json").expect("write corrupt file");

        let err = store.get_all().await.expect_err("corrupt");
        assert!(matches!(err, KeyStoreError::Storage { .. }));
        let err = store.create(new_record("a")).await.expect_err("corrupt");
        assert!(matches!(err, KeyStoreError::Storage { .. }));
    }

    #[tokio::test]
    async fn manager_initialization_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let secrets = vec![generate_secret(&OsRandom).expect("secret")];

        let manager = SigningKeyManager::from_secrets(&secrets, FileKeyStore::in_dir(dir.path()))
            .await
            .expect("first manager");
        let signing_kid = manager.get_signing_key().await.expect("key").kid().to_string();

        let reopened = SigningKeyManager::from_secrets(&secrets, FileKeyStore::in_dir(dir.path()))
            .await
            .expect("second manager");
        let records = reopened.store().get_all().await.expect("all");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].algorithm, SigningAlgorithm::Rs256);
        assert_eq!(records[0].key_size, Some(2048));
        assert_eq!(reopened.get_signing_key().await.expect("key").kid(), signing_kid);

        let on_disk = fs::read_to_string(reopened.store().path()).expect("read");
        assert!(!on_disk.contains(&secrets[0]));
        assert!(on_disk.contains("\"RS256\""));
    }
}
