//! Drains queued notifications through the push gateway.
//!
//! Every tick handles at most one batch. Each notification is delivered and
//! marked on its own: a failure while sending or marking one notification is
//! logged and never stops the rest of the batch. Failed notifications are
//! marked `error` and stay there.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::domain::Error;
use crate::domain::collections::NOTIFICATIONS;
use crate::domain::document::{DocumentPath, Fields, Snapshot, timestamp_value};
use crate::domain::mapping::map_store_error;
use crate::domain::notification::{NotificationRecord, NotificationStatus};
use crate::domain::ports::{DocumentQuery, DocumentStore, PushContent, PushGateway, PushMessage};
use crate::domain::reactor::{ScheduledJob, TickReport};
use crate::domain::schedule::Cadence;

/// Dispatcher batch and cadence settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum notifications drained per tick.
    pub batch_size: usize,
    pub interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            interval: Duration::from_secs(60),
        }
    }
}

/// Per-user topic a recipient's devices subscribe to.
///
/// # Examples
/// ```
/// use reactors::domain::recipient_topic;
///
/// assert_eq!(recipient_topic("u42"), "user_u42");
/// ```
pub fn recipient_topic(recipient: &str) -> String {
    format!("user_{recipient}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Failed,
}

/// Scheduled job delivering queued notifications.
pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PushGateway>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PushGateway>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            config,
        }
    }

    async fn deliver(&self, record: &NotificationRecord) -> Result<(), String> {
        if record.recipients.is_empty() {
            return Err("notification has no recipients".to_owned());
        }
        let data = BTreeMap::from([
            ("type".to_owned(), record.topic.clone()),
            ("entity".to_owned(), record.entity.clone()),
            ("entityId".to_owned(), record.entity_id.clone()),
        ]);
        for recipient in &record.recipients {
            let message = PushMessage {
                topic: recipient_topic(recipient),
                notification: PushContent {
                    title: record.title.clone(),
                    body: record.body.clone(),
                },
                data: data.clone(),
            };
            self.gateway
                .send(&message)
                .await
                .map_err(|error| error.to_string())?;
        }
        Ok(())
    }

    async fn process(&self, snapshot: Snapshot) -> Outcome {
        let path = snapshot.path().clone();
        let delivery = match NotificationRecord::from_fields(snapshot.into_fields()) {
            Ok(record) => self.deliver(&record).await,
            Err(error) => Err(format!("undecodable notification: {error}")),
        };

        let now = self.clock.utc();
        let (outcome, update) = match delivery {
            Ok(()) => (Outcome::Sent, sent_update(now)),
            Err(description) => {
                warn!(notification = %path, error = %description, "notification delivery failed");
                (Outcome::Failed, error_update(now, description))
            }
        };
        if let Err(error) = self.store.merge(&path, update).await {
            warn!(notification = %path, error = %error, "failed to record notification status");
            return Outcome::Failed;
        }
        outcome
    }
}

fn status_update(status: NotificationStatus, now: DateTime<Utc>) -> Fields {
    let mut update = Fields::new();
    update.insert("status".to_owned(), Value::from(status.as_str()));
    update.insert("updatedAt".to_owned(), timestamp_value(now));
    update
}

fn sent_update(now: DateTime<Utc>) -> Fields {
    let mut update = status_update(NotificationStatus::Sent, now);
    update.insert("sentAt".to_owned(), timestamp_value(now));
    update
}

fn error_update(now: DateTime<Utc>, description: String) -> Fields {
    let mut update = status_update(NotificationStatus::Error, now);
    update.insert("error".to_owned(), Value::String(description));
    update
}

#[async_trait]
impl ScheduledJob for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "notification_dispatcher"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Every(self.config.interval)
    }

    async fn run_tick(&self) -> Result<TickReport, Error> {
        let query = DocumentQuery::collection(NOTIFICATIONS)
            .equal("status", json!(NotificationStatus::Queued.as_str()))
            .limit(self.config.batch_size);
        let queued = self.store.query(&query).await.map_err(map_store_error)?;
        if queued.is_empty() {
            return Ok(TickReport::default());
        }

        let mut report = TickReport {
            examined: queued.len(),
            ..TickReport::default()
        };
        for snapshot in queued {
            match self.process(snapshot).await {
                Outcome::Sent => report.written += 1,
                Outcome::Failed => report.failed += 1,
            }
        }
        info!(
            examined = report.examined,
            sent = report.written,
            failed = report.failed,
            "notification batch dispatched"
        );
        Ok(report)
    }
}

/// Path of a notification document.
pub fn notification_path(id: &str) -> DocumentPath {
    DocumentPath::new(NOTIFICATIONS, id)
}
