//! Reactor configuration loaded via OrthoConfig.
//!
//! Every value is optional; accessors fall back to the defaults the reactors
//! ship with. Environment variables use the `REACTORS_` prefix, e.g.
//! `REACTORS_PUSH_ENDPOINT` or `REACTORS_DISPATCH_BATCH_SIZE`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{
    AuditDigestConfig, Cadence, CadenceParseError, DispatcherConfig, NotificationCleanupConfig,
    ReminderConfig, RetentionConfig, SequencerConfig,
};

const DEFAULT_PUSH_TIMEOUT_SECONDS: u64 = 10;

/// Configuration values for the reactor service and the `reactor-tick` tool.
#[derive(Debug, Clone, Default, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "REACTORS")]
pub struct ReactorSettings {
    /// Push gateway endpoint; messages are only logged when unset.
    pub push_endpoint: Option<String>,
    /// Bearer token sent to the push gateway.
    pub push_token: Option<String>,
    pub push_timeout_seconds: Option<u64>,
    /// Queued notifications drained per dispatcher tick.
    pub dispatch_batch_size: Option<usize>,
    pub dispatch_interval_seconds: Option<u64>,
    /// Hours past `dueAt` before a task counts as overdue.
    pub reminder_grace_hours: Option<u32>,
    /// Hours ahead of now the reminder query looks at.
    pub reminder_lookahead_hours: Option<u32>,
    /// Days a notification is kept before cleanup deletes it.
    pub notification_retention_days: Option<u32>,
    /// Soft-deleted documents purged per collection and tick.
    pub purge_limit: Option<usize>,
    /// Compare-and-set attempts per issued document number.
    pub sequencer_attempts: Option<u32>,
    /// Cadence of the soft-delete purge, e.g. `0 3 * * *`.
    pub retention_schedule: Option<String>,
    /// Cadence of the notification cleanup, e.g. `every 12 hours`.
    pub cleanup_schedule: Option<String>,
    /// Cadence of the audit digest, e.g. `every friday 17:00`.
    pub digest_schedule: Option<String>,
    /// JSON store snapshot loaded into the in-memory store at startup.
    pub snapshot_path: Option<PathBuf>,
}

impl ReactorSettings {
    /// Push endpoint, ignoring blank values.
    pub fn push_endpoint(&self) -> Option<&str> {
        self.push_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(
            self.push_timeout_seconds
                .unwrap_or(DEFAULT_PUSH_TIMEOUT_SECONDS)
                .max(1),
        )
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let defaults = DispatcherConfig::default();
        DispatcherConfig {
            batch_size: self.dispatch_batch_size.unwrap_or(defaults.batch_size).max(1),
            interval: self
                .dispatch_interval_seconds
                .map_or(defaults.interval, |seconds| Duration::from_secs(seconds.max(1))),
        }
    }

    pub fn reminder_config(&self) -> ReminderConfig {
        let defaults = ReminderConfig::default();
        ReminderConfig {
            grace: self
                .reminder_grace_hours
                .map_or(defaults.grace, |hours| TimeDelta::hours(i64::from(hours))),
            lookahead: self
                .reminder_lookahead_hours
                .map_or(defaults.lookahead, |hours| TimeDelta::hours(i64::from(hours))),
            ..defaults
        }
    }

    /// Purge settings.
    ///
    /// # Errors
    /// Returns [`CadenceParseError`] when `retention_schedule` is malformed.
    pub fn retention_config(&self) -> Result<RetentionConfig, CadenceParseError> {
        let defaults = RetentionConfig::default();
        Ok(RetentionConfig {
            per_collection_limit: self
                .purge_limit
                .unwrap_or(defaults.per_collection_limit)
                .max(1),
            cadence: cadence_or(self.retention_schedule.as_deref(), defaults.cadence)?,
            ..defaults
        })
    }

    /// Notification cleanup settings.
    ///
    /// # Errors
    /// Returns [`CadenceParseError`] when `cleanup_schedule` is malformed.
    pub fn cleanup_config(&self) -> Result<NotificationCleanupConfig, CadenceParseError> {
        let defaults = NotificationCleanupConfig::default();
        Ok(NotificationCleanupConfig {
            retention_days: self
                .notification_retention_days
                .unwrap_or(defaults.retention_days),
            cadence: cadence_or(self.cleanup_schedule.as_deref(), defaults.cadence)?,
            ..defaults
        })
    }

    /// Audit digest settings.
    ///
    /// # Errors
    /// Returns [`CadenceParseError`] when `digest_schedule` is malformed.
    pub fn digest_config(&self) -> Result<AuditDigestConfig, CadenceParseError> {
        let defaults = AuditDigestConfig::default();
        Ok(AuditDigestConfig {
            cadence: cadence_or(self.digest_schedule.as_deref(), defaults.cadence)?,
            ..defaults
        })
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        let defaults = SequencerConfig::default();
        SequencerConfig {
            max_attempts: self
                .sequencer_attempts
                .unwrap_or(defaults.max_attempts)
                .max(1),
        }
    }
}

/// Parses `raw` unless it is unset or blank.
fn cadence_or(raw: Option<&str>, fallback: Cadence) -> Result<Cadence, CadenceParseError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(expression) => expression.parse(),
        None => Ok(fallback),
    }
}
