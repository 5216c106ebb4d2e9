use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::keys::{KeyRecord, NewKeyRecord};

/// Errors produced by asymmetric key store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyStoreError {
    /// The store holds no records at all.
    #[error("key store is empty")]
    Empty,
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Durable storage of asymmetric key records.
///
/// Implementations assign ids in creation order: a record created later always
/// carries a higher id. Records are never updated or removed through this contract.
#[async_trait]
pub trait AsymmetricKeyStore: Send + Sync {
    /// Fetch a record by id; `Ok(None)` when no such record exists.
    async fn get(&self, id: u64) -> Result<Option<KeyRecord>, KeyStoreError>;

    /// All records, oldest first.
    async fn get_all(&self) -> Result<Vec<KeyRecord>, KeyStoreError>;

    /// The most recently created record.
    async fn get_last(&self) -> Result<KeyRecord, KeyStoreError>;

    /// Assign an id to the record and persist it.
    async fn create(&self, record: NewKeyRecord) -> Result<KeyRecord, KeyStoreError>;
}

/// In-memory key store for tests and ephemeral sessions.
/// Clones share the same records.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    inner: Arc<Mutex<Vec<KeyRecord>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with existing records, e.g. what survives a retention sweep.
    pub fn with_records(records: Vec<KeyRecord>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(records)),
        }
    }

    /// Number of persisted records.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<KeyRecord>>, KeyStoreError> {
        self.inner.lock().map_err(|err| KeyStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl AsymmetricKeyStore for InMemoryKeyStore {
    async fn get(&self, id: u64) -> Result<Option<KeyRecord>, KeyStoreError> {
        let records = self.lock()?;
        Ok(records.iter().find(|record| record.id == id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<KeyRecord>, KeyStoreError> {
        Ok(self.lock()?.clone())
    }

    async fn get_last(&self) -> Result<KeyRecord, KeyStoreError> {
        let records = self.lock()?;
        records
            .iter()
            .max_by_key(|record| record.id)
            .cloned()
            .ok_or(KeyStoreError::Empty)
    }

    async fn create(&self, record: NewKeyRecord) -> Result<KeyRecord, KeyStoreError> {
        let mut records = self.lock()?;
        let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let record = record.into_record(id);
        records.push(record.clone());
        Ok(record)
    }
}
