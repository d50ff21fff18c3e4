//! Audit trail for writes on tracked collections.
//!
//! One [`AuditEntry`] is appended per observed write. Entries are additive:
//! replaying the same change appends a second identical entry, which keeps the
//! recorder safe under at-least-once delivery without deduplication state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Error;
use super::collections::{AUDIT_LOGS, entity_type_for};
use super::document::{DocumentChange, DocumentPath, Fields, store_timestamp, str_field, to_fields};
use super::mapping::map_store_error;
use super::ports::DocumentStore;
use super::reactor::{ChangeReactor, Reaction};

mod digest;

pub use digest::{AuditDigestConfig, AuditDigestJob};

/// Fields copied into [`AuditEntry::details`] when present.
const DETAIL_FIELDS: &[&str] = &["title", "name", "status", "projectId", "concernID"];

/// Kind of write recorded by an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    /// Hard deletion of a soft-deleted document by the retention purger.
    #[serde(rename = "DELETE_CONFIRMED")]
    DeleteConfirmed,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::DeleteConfirmed => "DELETE_CONFIRMED",
        }
    }

    /// Whether the action removed the document.
    pub fn is_deletion(self) -> bool {
        matches!(self, Self::Delete | Self::DeleteConfirmed)
    }
}

/// Immutable audit record stored in `auditLogs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub entity_type: String,
    pub document_id: String,
    pub action: AuditAction,
    #[serde(with = "store_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    #[serde(default)]
    pub details: Fields,
    pub previous_value: Option<Fields>,
    pub new_value: Option<Fields>,
}

impl AuditEntry {
    /// Build the entry describing one observed write.
    ///
    /// The acting user is read from the after snapshot, then the before
    /// snapshot, then the trigger's authenticated actor.
    ///
    /// # Examples
    /// ```
    /// use chrono::Utc;
    /// use reactors::domain::{AuditAction, AuditEntry, DocumentChange, DocumentPath};
    /// use serde_json::json;
    ///
    /// let before = json!({ "status": "todo", "userId": "u1" });
    /// let change = DocumentChange::new(
    ///     DocumentPath::new("punches", "p1"),
    ///     before.as_object().cloned(),
    ///     None,
    /// );
    /// let entry = AuditEntry::for_change(&change, Utc::now());
    /// assert_eq!(entry.action, AuditAction::Delete);
    /// assert_eq!(entry.entity_type, "timeEntries");
    /// assert_eq!(entry.user_id.as_deref(), Some("u1"));
    /// ```
    pub fn for_change(change: &DocumentChange, timestamp: DateTime<Utc>) -> Self {
        let action = match (change.before(), change.after()) {
            (None, Some(_)) => AuditAction::Create,
            (Some(_), None) => AuditAction::Delete,
            _ => AuditAction::Update,
        };
        let user_id = actor_field(change, "userId").or_else(|| change.actor_id().map(str::to_owned));
        let user_email = actor_field(change, "userEmail");
        let details = change
            .after()
            .or(change.before())
            .map(extract_details)
            .unwrap_or_default();

        Self {
            entity_type: entity_type_for(change.path().collection()).to_owned(),
            document_id: change.path().id().to_owned(),
            action,
            timestamp,
            user_id,
            user_email,
            details,
            previous_value: change.before().cloned(),
            new_value: change.after().cloned(),
        }
    }

    /// Entry confirming the hard deletion of a soft-deleted document.
    pub fn delete_confirmed(path: &DocumentPath, timestamp: DateTime<Utc>) -> Self {
        Self {
            entity_type: entity_type_for(path.collection()).to_owned(),
            document_id: path.id().to_owned(),
            action: AuditAction::DeleteConfirmed,
            timestamp,
            user_id: None,
            user_email: None,
            details: Fields::new(),
            previous_value: None,
            new_value: None,
        }
    }
}

fn actor_field(change: &DocumentChange, name: &str) -> Option<String> {
    change
        .after()
        .and_then(|fields| str_field(fields, name))
        .or_else(|| change.before().and_then(|fields| str_field(fields, name)))
        .map(str::to_owned)
}

fn extract_details(fields: &Fields) -> Fields {
    DETAIL_FIELDS
        .iter()
        .filter_map(|name| {
            fields
                .get(*name)
                .filter(|value| !value.is_null())
                .map(|value| ((*name).to_owned(), value.clone()))
        })
        .collect()
}

/// Append one audit entry to the store.
pub(crate) async fn append_entry(store: &dyn DocumentStore, entry: &AuditEntry) -> Result<DocumentPath, Error> {
    let fields = to_fields(entry)
        .map_err(|error| Error::internal(format!("audit entry serialisation failed: {error}")))?;
    store.add(AUDIT_LOGS, fields).await.map_err(map_store_error)
}

/// Change reactor appending one audit entry per write on a tracked collection.
pub struct AuditRecorder {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record one observed write.
    pub async fn record(&self, change: &DocumentChange) -> Result<AuditEntry, Error> {
        let entry = AuditEntry::for_change(change, self.clock.utc());
        let stored_at = append_entry(self.store.as_ref(), &entry).await?;
        debug!(
            path = %change.path(),
            action = entry.action.as_str(),
            audit_entry = %stored_at,
            "audit entry appended"
        );
        Ok(entry)
    }
}

#[async_trait]
impl ChangeReactor for AuditRecorder {
    fn name(&self) -> &'static str {
        "audit_recorder"
    }

    async fn react(&self, change: &DocumentChange) -> Result<Reaction, Error> {
        self.record(change).await?;
        Ok(Reaction::wrote(1))
    }
}

#[cfg(test)]
mod tests;
