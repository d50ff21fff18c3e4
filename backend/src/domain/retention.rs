//! Retention jobs: hard deletion of soft-deleted documents and cleanup of
//! old notifications.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::{info, warn};

use super::Error;
use super::audit::{AuditEntry, append_entry};
use super::collections::{NOTIFICATIONS, PROJECT_DOCUMENTS, TRACKED_COLLECTIONS};
use super::document::{Snapshot, instant_field};
use super::mapping::map_store_error;
use super::ports::{DocumentQuery, DocumentStore, WriteBatch};
use super::reactor::{ScheduledJob, TickReport};
use super::schedule::Cadence;

/// Soft-delete deadline field.
pub const SOFT_DELETE_FIELD: &str = "toBeDeletedAt";

/// Collections purged by default: every tracked collection plus project
/// documents.
pub fn default_purge_collections() -> Vec<String> {
    TRACKED_COLLECTIONS
        .iter()
        .map(|(collection, _)| (*collection).to_owned())
        .chain(std::iter::once(PROJECT_DOCUMENTS.to_owned()))
        .collect()
}

/// Whether `created_at` lies more than `days` days before `now`.
///
/// # Examples
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use reactors::domain::is_older_than;
///
/// let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single().expect("valid time");
/// assert!(is_older_than(90, now - TimeDelta::days(91), now));
/// assert!(!is_older_than(90, now - TimeDelta::days(89), now));
/// ```
pub fn is_older_than(days: u32, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(created_at) > TimeDelta::days(i64::from(days))
}

/// Settings for [`RetentionPurger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionConfig {
    pub collections: Vec<String>,
    /// Documents purged per collection and tick.
    pub per_collection_limit: usize,
    pub cadence: Cadence,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            collections: default_purge_collections(),
            per_collection_limit: 1000,
            cadence: Cadence::DailyAt(NaiveTime::default()),
        }
    }
}

/// Daily job hard-deleting documents whose soft-delete deadline passed.
///
/// Failures are isolated per document and per collection.
pub struct RetentionPurger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: RetentionConfig,
}

impl RetentionPurger {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: RetentionConfig) -> Self {
        Self { store, clock, config }
    }

    async fn purge_one(&self, snapshot: &Snapshot) -> Result<(), Error> {
        self.store
            .delete(snapshot.path())
            .await
            .map_err(map_store_error)?;
        let entry = AuditEntry::delete_confirmed(snapshot.path(), self.clock.utc());
        append_entry(self.store.as_ref(), &entry).await?;
        Ok(())
    }

    async fn purge_collection(&self, collection: &str, now: DateTime<Utc>, report: &mut TickReport) {
        let query = DocumentQuery::collection(collection)
            .at_or_before(SOFT_DELETE_FIELD, now)
            .limit(self.config.per_collection_limit);
        let expired = match self.store.query(&query).await {
            Ok(expired) => expired,
            Err(error) => {
                warn!(collection, error = %error, "soft-delete scan failed; skipping collection");
                report.failed += 1;
                return;
            }
        };

        report.examined += expired.len();
        for snapshot in &expired {
            match self.purge_one(snapshot).await {
                Ok(()) => report.written += 1,
                Err(error) => {
                    warn!(document = %snapshot.path(), error = %error, "purge failed; continuing");
                    report.failed += 1;
                }
            }
        }
    }
}

#[async_trait]
impl ScheduledJob for RetentionPurger {
    fn name(&self) -> &'static str {
        "retention_purge"
    }

    fn cadence(&self) -> Cadence {
        self.config.cadence
    }

    async fn run_tick(&self) -> Result<TickReport, Error> {
        let now = self.clock.utc();
        let mut report = TickReport::default();
        for collection in &self.config.collections {
            self.purge_collection(collection, now, &mut report).await;
        }
        info!(
            purged = report.written,
            failed = report.failed,
            "retention purge finished"
        );
        Ok(report)
    }
}

/// Settings for [`NotificationCleanup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationCleanupConfig {
    pub retention_days: u32,
    /// Deletes per tick; all of them commit in one batch.
    pub batch_limit: usize,
    pub cadence: Cadence,
}

impl Default for NotificationCleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            batch_limit: 500,
            cadence: Cadence::DailyAt(NaiveTime::from_hms_opt(2, 0, 0).unwrap_or_default()),
        }
    }
}

/// Daily job deleting notifications past the retention window.
pub struct NotificationCleanup {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: NotificationCleanupConfig,
}

impl NotificationCleanup {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: NotificationCleanupConfig,
    ) -> Self {
        Self { store, clock, config }
    }
}

#[async_trait]
impl ScheduledJob for NotificationCleanup {
    fn name(&self) -> &'static str {
        "notification_cleanup"
    }

    fn cadence(&self) -> Cadence {
        self.config.cadence
    }

    async fn run_tick(&self) -> Result<TickReport, Error> {
        let now = self.clock.utc();
        // Windows reaching past the representable range match nothing.
        let cutoff = TimeDelta::try_days(i64::from(self.config.retention_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let query = DocumentQuery::collection(NOTIFICATIONS)
            .before("createdAt", cutoff)
            .limit(self.config.batch_limit);
        let candidates = self.store.query(&query).await.map_err(map_store_error)?;

        let mut batch = WriteBatch::new();
        for snapshot in &candidates {
            let expired = instant_field(snapshot.fields(), "createdAt")
                .is_some_and(|created_at| is_older_than(self.config.retention_days, created_at, now));
            if expired {
                batch.delete(snapshot.path().clone());
            }
        }

        let deleted = batch.len();
        if !batch.is_empty() {
            self.store.commit(batch).await.map_err(map_store_error)?;
        }
        info!(deleted, "notification cleanup finished");
        Ok(TickReport {
            examined: candidates.len(),
            written: deleted,
            failed: 0,
        })
    }
}
