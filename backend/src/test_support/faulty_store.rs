//! Document store wrapper injecting failures for chosen paths and collections.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::ports::{DocumentQuery, DocumentStore, DocumentStoreError, WriteBatch, WriteOp};
use crate::domain::{DocumentPath, Fields, Snapshot};
use crate::outbound::memory_store::InMemoryDocumentStore;

#[derive(Default)]
struct Faults {
    paths: BTreeSet<DocumentPath>,
    collections: BTreeSet<String>,
}

/// Delegates to an [`InMemoryDocumentStore`] unless a fault is armed.
///
/// Writes addressed to a failing path and queries over a failing collection
/// return [`DocumentStoreError::Unavailable`]; `add` and `get` always pass
/// through.
pub struct FaultyStore {
    inner: Arc<InMemoryDocumentStore>,
    faults: Mutex<Faults>,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn fail_writes_to(&self, path: DocumentPath) {
        self.lock().paths.insert(path);
    }

    pub fn fail_queries_on(&self, collection: &str) {
        self.lock().collections.insert(collection.to_owned());
    }

    fn lock(&self) -> MutexGuard<'_, Faults> {
        match self.faults.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("fault mutex"),
        }
    }

    fn check_write(&self, path: &DocumentPath) -> Result<(), DocumentStoreError> {
        if self.lock().paths.contains(path) {
            return Err(DocumentStoreError::unavailable(format!("injected write failure for {path}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Snapshot>, DocumentStoreError> {
        self.inner.get(path).await
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<DocumentPath, DocumentStoreError> {
        self.inner.add(collection, fields).await
    }

    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), DocumentStoreError> {
        self.check_write(path)?;
        self.inner.set(path, fields).await
    }

    async fn merge(&self, path: &DocumentPath, fields: Fields) -> Result<(), DocumentStoreError> {
        self.check_write(path)?;
        self.inner.merge(path, fields).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), DocumentStoreError> {
        self.check_write(path)?;
        self.inner.delete(path).await
    }

    async fn increment(&self, path: &DocumentPath, field: &str, delta: i64) -> Result<(), DocumentStoreError> {
        self.check_write(path)?;
        self.inner.increment(path, field, delta).await
    }

    async fn compare_and_set(
        &self,
        path: &DocumentPath,
        expected_version: Option<u64>,
        fields: Fields,
    ) -> Result<(), DocumentStoreError> {
        self.check_write(path)?;
        self.inner.compare_and_set(path, expected_version, fields).await
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Snapshot>, DocumentStoreError> {
        if self.lock().collections.contains(&query.collection) {
            return Err(DocumentStoreError::unavailable(format!(
                "injected query failure for {}",
                query.collection
            )));
        }
        self.inner.query(query).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), DocumentStoreError> {
        let touched = batch.ops().iter().find_map(|op| {
            let path = match op {
                WriteOp::Set { path, .. } | WriteOp::Merge { path, .. } | WriteOp::Delete { path } => path,
            };
            self.check_write(path).err()
        });
        if let Some(error) = touched {
            return Err(DocumentStoreError::batch_rejected(error.to_string()));
        }
        self.inner.commit(batch).await
    }
}
