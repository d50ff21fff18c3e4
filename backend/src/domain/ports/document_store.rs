//! Driven port for the shared document store.
//!
//! The domain owns the query and batch shapes so reactors can be exercised
//! against the in-memory adapter or a scripted double without knowing how a
//! production database encodes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::define_port_error;
use crate::domain::document::{DocumentPath, Fields, Snapshot, resolve_instant};

/// Comparison applied to one field by a [`DocumentQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Field equals the value.
    Equal(Value),
    /// Field equals one of the values.
    In(Vec<Value>),
    /// Field resolves to an instant at or before the bound.
    AtOrBefore(DateTime<Utc>),
    /// Field resolves to an instant strictly before the bound.
    Before(DateTime<Utc>),
    /// Field resolves to an instant at or after the bound.
    AtOrAfter(DateTime<Utc>),
}

/// Predicate on a single top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
}

impl FieldFilter {
    /// Evaluate the filter; missing fields and unresolvable timestamps never
    /// match.
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(value) = fields.get(&self.field) else {
            return false;
        };
        match &self.op {
            FilterOp::Equal(expected) => value == expected,
            FilterOp::In(candidates) => candidates.contains(value),
            FilterOp::AtOrBefore(bound) => resolve_instant(value).is_some_and(|at| at <= *bound),
            FilterOp::Before(bound) => resolve_instant(value).is_some_and(|at| at < *bound),
            FilterOp::AtOrAfter(bound) => resolve_instant(value).is_some_and(|at| at >= *bound),
        }
    }
}

/// Conjunctive filter over one collection with an optional result cap.
///
/// # Examples
/// ```
/// use reactors::domain::ports::DocumentQuery;
/// use serde_json::json;
///
/// let query = DocumentQuery::collection("notifications")
///     .equal("status", json!("queued"))
///     .limit(50);
/// assert_eq!(query.collection, "notifications");
/// assert_eq!(query.limit, Some(50));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    /// Start a query over every document in `collection`.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            limit: None,
        }
    }

    fn with(mut self, field: impl Into<String>, op: FilterOp) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op,
        });
        self
    }

    pub fn equal(self, field: impl Into<String>, value: Value) -> Self {
        self.with(field, FilterOp::Equal(value))
    }

    pub fn one_of(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, FilterOp::In(values))
    }

    pub fn at_or_before(self, field: impl Into<String>, bound: DateTime<Utc>) -> Self {
        self.with(field, FilterOp::AtOrBefore(bound))
    }

    pub fn before(self, field: impl Into<String>, bound: DateTime<Utc>) -> Self {
        self.with(field, FilterOp::Before(bound))
    }

    pub fn at_or_after(self, field: impl Into<String>, bound: DateTime<Utc>) -> Self {
        self.with(field, FilterOp::AtOrAfter(bound))
    }

    /// Cap the number of returned documents.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document in this query's collection satisfies every filter.
    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|filter| filter.matches(fields))
    }
}

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the document with `fields`, creating it if needed.
    Set { path: DocumentPath, fields: Fields },
    /// Overwrite the given top-level fields, creating the document if needed.
    Merge { path: DocumentPath, fields: Fields },
    /// Remove the document; deleting a missing document is not an error.
    Delete { path: DocumentPath },
}

/// Writes committed together, all or nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Set { path, fields });
        self
    }

    pub fn merge(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Merge { path, fields });
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

define_port_error! {
    /// Errors surfaced by document store adapters.
    pub enum DocumentStoreError {
        /// Store is unreachable or its internal state is unusable.
        Unavailable { message: String } =>
            "document store unavailable: {message}",
        /// Operation requires an existing document.
        NotFound { path: String } =>
            "document {path} does not exist",
        /// Compare-and-set observed a different version.
        Conflict { path: String } =>
            "document {path} changed concurrently",
        /// Adapter refused the write before applying it.
        InvalidWrite { message: String } =>
            "document write rejected: {message}",
        /// Batch failed; none of its writes were applied.
        BatchRejected { message: String } =>
            "batch commit failed: {message}",
    }
}

impl DocumentStoreError {
    /// Whether the failure is a lost compare-and-set race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Port for reading and writing documents in the shared store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Snapshot>, DocumentStoreError>;

    /// Insert a document under a store-generated identifier.
    async fn add(&self, collection: &str, fields: Fields)
    -> Result<DocumentPath, DocumentStoreError>;

    /// Replace a document, creating it when missing.
    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), DocumentStoreError>;

    /// Overwrite top-level fields, creating the document when missing.
    async fn merge(&self, path: &DocumentPath, fields: Fields) -> Result<(), DocumentStoreError>;

    /// Remove a document. Missing documents are ignored.
    async fn delete(&self, path: &DocumentPath) -> Result<(), DocumentStoreError>;

    /// Atomically add `delta` to an integer field of an existing document.
    ///
    /// Missing or non-integer fields count as zero.
    async fn increment(
        &self,
        path: &DocumentPath,
        field: &str,
        delta: i64,
    ) -> Result<(), DocumentStoreError>;

    /// Replace a document only if its version is still `expected_version`.
    ///
    /// `None` requires the document to be absent.
    async fn compare_and_set(
        &self,
        path: &DocumentPath,
        expected_version: Option<u64>,
        fields: Fields,
    ) -> Result<(), DocumentStoreError>;

    /// Return documents matching every filter, in identifier order.
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Snapshot>, DocumentStoreError>;

    /// Apply every write of the batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), DocumentStoreError>;
}
