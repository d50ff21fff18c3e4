//! Hourly reminder evaluation forcing overdue tasks to `blocked`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::Error;
use super::collections::TASKS;
use super::document::{Fields, instant_field, str_field, timestamp_value};
use super::mapping::map_store_error;
use super::ports::{DocumentQuery, DocumentStore, WriteBatch};
use super::reactor::{ScheduledJob, TickReport};
use super::schedule::Cadence;

/// Task statuses still eligible for reminders.
pub const ACTIVE_TASK_STATUSES: [&str; 3] = ["todo", "in_progress", "blocked"];

const BLOCKED: &str = "blocked";

/// Timing constants for the reminder tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderConfig {
    /// Time past `dueAt` after which a task counts as overdue.
    pub grace: TimeDelta,
    /// How far ahead of now tasks are considered at all.
    pub lookahead: TimeDelta,
    pub interval: Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            grace: TimeDelta::hours(1),
            lookahead: TimeDelta::hours(24),
            interval: Duration::from_secs(3600),
        }
    }
}

/// Whether a task due at `due_at` is overdue at `now` given `grace`.
///
/// # Examples
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use reactors::domain::is_overdue;
///
/// let due = Utc.with_ymd_and_hms(2025, 1, 2, 1, 0, 0).single().expect("valid time");
/// let grace = TimeDelta::hours(1);
/// assert!(!is_overdue(due, due + grace, grace));
/// assert!(is_overdue(due, due + grace + TimeDelta::seconds(1), grace));
/// ```
pub fn is_overdue(due_at: DateTime<Utc>, now: DateTime<Utc>, grace: TimeDelta) -> bool {
    due_at
        .checked_add_signed(grace)
        .is_some_and(|deadline| now > deadline)
}

/// Scheduled job flagging overdue active tasks.
pub struct ReminderEvaluator {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
}

impl ReminderEvaluator {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: ReminderConfig) -> Self {
        Self { store, clock, config }
    }

    fn needs_blocking(&self, fields: &Fields, now: DateTime<Utc>) -> bool {
        let Some(due_at) = instant_field(fields, "dueAt") else {
            return false;
        };
        is_overdue(due_at, now, self.config.grace) && str_field(fields, "status") != Some(BLOCKED)
    }
}

#[async_trait]
impl ScheduledJob for ReminderEvaluator {
    fn name(&self) -> &'static str {
        "task_reminders"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Every(self.config.interval)
    }

    async fn run_tick(&self) -> Result<TickReport, Error> {
        let now = self.clock.utc();
        let horizon = now
            .checked_add_signed(self.config.lookahead)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let query = DocumentQuery::collection(TASKS)
            .one_of(
                "status",
                ACTIVE_TASK_STATUSES.iter().map(|status| json!(status)).collect(),
            )
            .at_or_before("dueAt", horizon);
        let tasks = self.store.query(&query).await.map_err(map_store_error)?;

        let mut batch = WriteBatch::new();
        for task in &tasks {
            if self.needs_blocking(task.fields(), now) {
                debug!(task = %task.path(), "task overdue; blocking");
                let mut update = Fields::new();
                update.insert("status".to_owned(), Value::from(BLOCKED));
                update.insert("updatedAt".to_owned(), timestamp_value(now));
                batch.merge(task.path().clone(), update);
            }
        }

        let written = batch.len();
        if !batch.is_empty() {
            self.store.commit(batch).await.map_err(map_store_error)?;
        }
        info!(examined = tasks.len(), blocked = written, "reminder tick finished");
        Ok(TickReport {
            examined: tasks.len(),
            written,
            failed: 0,
        })
    }
}
