//! Notification records and the outbox producers enqueue into.
//!
//! Producers write `queued` notifications; only the dispatcher moves them to
//! `sent` or `error`. Both terminal states are final.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::Error;
use super::collections::NOTIFICATIONS;
use super::document::{DocumentPath, Fields, store_timestamp, to_fields};
use super::mapping::map_store_error;
use super::ports::DocumentStore;

/// Delivery state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Error,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Error => "error",
        }
    }
}

/// Notification content chosen by a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    /// Topic, e.g. `workorder.assigned`.
    pub topic: String,
    /// Collection of the entity the notification is about.
    pub entity: String,
    pub entity_id: String,
    pub recipients: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: Fields,
}

impl NotificationDraft {
    pub fn new(
        topic: impl Into<String>,
        entity: &DocumentPath,
        recipients: Vec<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            entity: entity.collection().to_owned(),
            entity_id: entity.id().to_owned(),
            recipients,
            title: title.into(),
            body: body.into(),
            data: Fields::new(),
        }
    }

    /// Attach a structured payload field.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_owned(), value);
        self
    }
}

/// Stored shape of a document in `notifications`.
///
/// Decoding is lenient about optional bookkeeping fields so documents written
/// by older clients still drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(rename = "type")]
    pub topic: String,
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub data: Fields,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub deleted_by: Vec<String>,
    pub status: NotificationStatus,
    #[serde(
        default,
        with = "store_timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "store_timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "store_timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationRecord {
    /// Fresh `queued` record for a draft.
    pub fn queued(draft: NotificationDraft, now: DateTime<Utc>) -> Self {
        let NotificationDraft {
            topic,
            entity,
            entity_id,
            recipients,
            title,
            body,
            data,
        } = draft;
        Self {
            topic,
            entity,
            entity_id,
            recipients,
            title,
            body,
            data,
            read_by: Vec::new(),
            deleted_by: Vec::new(),
            status: NotificationStatus::Queued,
            created_at: Some(now),
            updated_at: Some(now),
            sent_at: None,
            error: None,
        }
    }

    /// Decode a stored notification.
    pub fn from_fields(fields: Fields) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(fields))
    }
}

/// Writes queued notifications on behalf of producers.
#[derive(Clone)]
pub struct NotificationOutbox {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl NotificationOutbox {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Insert one `queued` notification and return its path.
    pub async fn enqueue(&self, draft: NotificationDraft) -> Result<DocumentPath, Error> {
        let record = NotificationRecord::queued(draft, self.clock.utc());
        let fields = to_fields(&record)
            .map_err(|error| Error::internal(format!("notification serialisation failed: {error}")))?;
        let path = self
            .store
            .add(NOTIFICATIONS, fields)
            .await
            .map_err(map_store_error)?;
        debug!(
            notification = %path,
            topic = record.topic.as_str(),
            recipients = record.recipients.len(),
            "notification queued"
        );
        Ok(path)
    }
}
