//! In-process document store with a lossless change feed.
//!
//! Backs the service binary, the `reactor-tick` tool and the test suites.
//! Every mutation runs under one mutex, so batches and compare-and-set are
//! trivially atomic. Each write publishes a [`DocumentChange`] carrying the
//! before and after snapshots to every subscriber; writes that leave a
//! document absent publish nothing. Subscriber queues are unbounded, so a
//! slow consumer delays changes but never loses them.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, trace};
use uuid::Uuid;

use crate::domain::ports::{DocumentQuery, DocumentStore, DocumentStoreError, WriteBatch, WriteOp};
use crate::domain::{DocumentChange, DocumentPath, DocumentPathError, Fields, Snapshot};

mod snapshot_file;

pub use snapshot_file::{SnapshotFileError, read_dump, write_dump};

/// Receiving end of the change feed.
pub type ChangeFeed = mpsc::UnboundedReceiver<DocumentChange>;

/// Serialisable dump of every stored document keyed by full path.
pub type StoreDump = BTreeMap<String, Fields>;

#[derive(Debug, Clone)]
struct StoredDocument {
    fields: Fields,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<DocumentPath, StoredDocument>,
    last_version: u64,
}

impl State {
    fn next_version(&mut self) -> u64 {
        self.last_version = self.last_version.saturating_add(1);
        self.last_version
    }

    fn snapshot(&self, path: &DocumentPath) -> Option<Snapshot> {
        self.documents
            .get(path)
            .map(|stored| Snapshot::new(path.clone(), stored.fields.clone(), stored.version))
    }

    /// Store `fields` at `path` and describe the write.
    fn put(&mut self, path: &DocumentPath, fields: Fields) -> DocumentChange {
        let version = self.next_version();
        let before = self
            .documents
            .insert(
                path.clone(),
                StoredDocument {
                    fields: fields.clone(),
                    version,
                },
            )
            .map(|previous| previous.fields);
        DocumentChange::new(path.clone(), before, Some(fields))
    }

    fn merge(&mut self, path: &DocumentPath, update: Fields) -> DocumentChange {
        let mut merged = self
            .documents
            .get(path)
            .map(|stored| stored.fields.clone())
            .unwrap_or_default();
        merged.extend(update);
        self.put(path, merged)
    }

    fn remove(&mut self, path: &DocumentPath) -> Option<DocumentChange> {
        self.documents
            .remove(path)
            .map(|previous| DocumentChange::new(path.clone(), Some(previous.fields), None))
    }

    fn apply(&mut self, op: WriteOp) -> Option<DocumentChange> {
        match op {
            WriteOp::Set { path, fields } => Some(self.put(&path, fields)),
            WriteOp::Merge { path, fields } => Some(self.merge(&path, fields)),
            WriteOp::Delete { path } => self.remove(&path),
        }
    }
}

/// Errors raised while loading a [`StoreDump`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid document path `{path}` in store dump: {source}")]
pub struct StoreDumpError {
    pub path: String,
    #[source]
    pub source: DocumentPathError,
}

/// Mutex-guarded document store publishing every write to subscribers.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: Mutex<State>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DocumentChange>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a dump without publishing changes.
    ///
    /// # Examples
    /// ```
    /// use reactors::outbound::memory_store::{InMemoryDocumentStore, StoreDump};
    /// use serde_json::json;
    ///
    /// let dump: StoreDump = serde_json::from_value(json!({
    ///     "tasks/t1": { "status": "todo" }
    /// }))
    /// .expect("dump");
    /// let store = InMemoryDocumentStore::from_dump(dump).expect("valid dump");
    /// assert_eq!(store.dump().expect("dump").len(), 1);
    /// ```
    pub fn from_dump(dump: StoreDump) -> Result<Self, StoreDumpError> {
        let mut state = State::default();
        for (raw, fields) in dump {
            let path = DocumentPath::parse(&raw).map_err(|source| StoreDumpError {
                path: raw.clone(),
                source,
            })?;
            state.put(&path, fields);
        }
        Ok(Self {
            state: Mutex::new(state),
            subscribers: Mutex::default(),
        })
    }

    /// Every stored document keyed by full path.
    pub fn dump(&self) -> Result<StoreDump, DocumentStoreError> {
        let state = self.lock()?;
        Ok(state
            .documents
            .iter()
            .map(|(path, stored)| (path.to_string(), stored.fields.clone()))
            .collect())
    }

    /// Subscribe to every change published from now on.
    pub fn subscribe(&self) -> Result<ChangeFeed, DocumentStoreError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .map_err(|_| DocumentStoreError::unavailable("change feed subscribers poisoned"))?
            .push(sender);
        Ok(receiver)
    }

    /// Insert a document without publishing a change.
    pub fn seed(&self, path: DocumentPath, fields: Fields) -> Result<(), DocumentStoreError> {
        let mut state = self.lock()?;
        state.put(&path, fields);
        Ok(())
    }

    /// Every document directly inside `collection`, in identifier order.
    pub fn documents_in(&self, collection: &str) -> Result<Vec<Snapshot>, DocumentStoreError> {
        let state = self.lock()?;
        Ok(state
            .documents
            .iter()
            .filter(|(path, _)| path.collection() == collection)
            .map(|(path, stored)| Snapshot::new(path.clone(), stored.fields.clone(), stored.version))
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, DocumentStoreError> {
        self.state
            .lock()
            .map_err(|_| DocumentStoreError::unavailable("document store state poisoned"))
    }

    fn publish(&self, changes: Vec<DocumentChange>) {
        if changes.is_empty() {
            return;
        }
        let Ok(mut subscribers) = self.subscribers.lock() else {
            error!(changes = changes.len(), "change feed subscribers poisoned; changes not published");
            return;
        };
        for change in changes {
            trace!(path = %change.path(), "change published");
            // Closed receivers are dropped from the subscriber list.
            subscribers.retain(|subscriber| subscriber.send(change.clone()).is_ok());
        }
    }
}

fn validate_collection(collection: &str) -> Result<(), DocumentStoreError> {
    DocumentPath::parse(&format!("{collection}/probe"))
        .map(|_| ())
        .map_err(|error| DocumentStoreError::invalid_write(error.to_string()))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Snapshot>, DocumentStoreError> {
        Ok(self.lock()?.snapshot(path))
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<DocumentPath, DocumentStoreError> {
        validate_collection(collection)?;
        let path = DocumentPath::new(collection, Uuid::new_v4().simple().to_string());
        let change = self.lock()?.put(&path, fields);
        self.publish(vec![change]);
        Ok(path)
    }

    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), DocumentStoreError> {
        let change = self.lock()?.put(path, fields);
        self.publish(vec![change]);
        Ok(())
    }

    async fn merge(&self, path: &DocumentPath, fields: Fields) -> Result<(), DocumentStoreError> {
        let change = self.lock()?.merge(path, fields);
        self.publish(vec![change]);
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), DocumentStoreError> {
        let change = self.lock()?.remove(path);
        self.publish(change.into_iter().collect());
        Ok(())
    }

    async fn increment(&self, path: &DocumentPath, field: &str, delta: i64) -> Result<(), DocumentStoreError> {
        let change = {
            let mut state = self.lock()?;
            let Some(stored) = state.documents.get(path) else {
                return Err(DocumentStoreError::not_found(path.to_string()));
            };
            let current = stored.fields.get(field).and_then(Value::as_i64).unwrap_or(0);
            let mut update = Fields::new();
            update.insert(field.to_owned(), Value::from(current.saturating_add(delta)));
            state.merge(path, update)
        };
        self.publish(vec![change]);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        path: &DocumentPath,
        expected_version: Option<u64>,
        fields: Fields,
    ) -> Result<(), DocumentStoreError> {
        let change = {
            let mut state = self.lock()?;
            let current = state.documents.get(path).map(|stored| stored.version);
            if current != expected_version {
                return Err(DocumentStoreError::conflict(path.to_string()));
            }
            state.put(path, fields)
        };
        self.publish(vec![change]);
        Ok(())
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Snapshot>, DocumentStoreError> {
        let state = self.lock()?;
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(state
            .documents
            .iter()
            .filter(|(path, stored)| path.collection() == query.collection && query.matches(&stored.fields))
            .take(limit)
            .map(|(path, stored)| Snapshot::new(path.clone(), stored.fields.clone(), stored.version))
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), DocumentStoreError> {
        let changes: Vec<DocumentChange> = {
            let mut state = self.lock()?;
            batch
                .into_ops()
                .into_iter()
                .filter_map(|op| state.apply(op))
                .collect()
        };
        self.publish(changes);
        Ok(())
    }
}
