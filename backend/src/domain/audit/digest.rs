//! Weekly digest of audit activity for administrators.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc, Weekday};
use mockable::Clock;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::AuditAction;
use crate::domain::Error;
use crate::domain::collections::{AUDIT_DIGESTS, AUDIT_LOGS, USERS};
use crate::domain::document::{Fields, Snapshot, instant_field, store_timestamp, str_field, to_fields};
use crate::domain::mapping::map_store_error;
use crate::domain::ports::{DocumentQuery, DocumentStore};
use crate::domain::reactor::{ScheduledJob, TickReport};
use crate::domain::schedule::Cadence;

/// Digest window and size limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDigestConfig {
    pub lookback: TimeDelta,
    /// Maximum audit entries read per digest.
    pub max_entries: usize,
    /// Maximum administrators addressed.
    pub max_recipients: usize,
    /// Deletions listed verbatim in the summary text.
    pub listed_deletions: usize,
    pub cadence: Cadence,
}

impl Default for AuditDigestConfig {
    fn default() -> Self {
        Self {
            lookback: TimeDelta::days(7),
            max_entries: 10_000,
            max_recipients: 50,
            listed_deletions: 20,
            cadence: Cadence::WeeklyAt(
                Weekday::Mon,
                NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditDigest {
    #[serde(with = "store_timestamp")]
    generated_at: DateTime<Utc>,
    summary: String,
    recipients: Vec<String>,
    stats: BTreeMap<String, BTreeMap<String, u64>>,
    deletion_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Deletion {
    entity_type: String,
    document_id: String,
    actor: Option<String>,
    at: Option<DateTime<Utc>>,
}

/// Scheduled job writing one `auditDigests` record per week.
pub struct AuditDigestJob {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: AuditDigestConfig,
}

impl AuditDigestJob {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: AuditDigestConfig) -> Self {
        Self { store, clock, config }
    }

    async fn admin_emails(&self) -> Result<Vec<String>, Error> {
        let query = DocumentQuery::collection(USERS)
            .equal("role", json!("admin"))
            .limit(self.config.max_recipients);
        let admins = self.store.query(&query).await.map_err(map_store_error)?;
        Ok(admins
            .iter()
            .filter_map(|admin| str_field(admin.fields(), "email"))
            .map(str::to_owned)
            .collect())
    }

    fn summarise(
        &self,
        stats: &BTreeMap<String, BTreeMap<String, u64>>,
        deletions: &[Deletion],
    ) -> String {
        let mut summary = format!(
            "Audit Digest (last {} days)\n\nActions by entity:\n",
            self.config.lookback.num_days()
        );
        for (entity_type, counts) in stats {
            let count = |action: AuditAction| counts.get(action.as_str()).copied().unwrap_or(0);
            summary.push_str(&format!(
                "  {entity_type}: {} creates, {} updates, {} deletes, {} confirmed deletions\n",
                count(AuditAction::Create),
                count(AuditAction::Update),
                count(AuditAction::Delete),
                count(AuditAction::DeleteConfirmed),
            ));
        }
        summary.push_str(&format!("\nDeletions ({}):", deletions.len()));
        for deletion in deletions.iter().take(self.config.listed_deletions) {
            let actor = deletion.actor.as_deref().unwrap_or("unknown");
            let at = deletion
                .at
                .map_or_else(|| "unknown time".to_owned(), |at| at.to_rfc3339());
            summary.push_str(&format!(
                "\n  {}/{} by {actor} at {at}",
                deletion.entity_type, deletion.document_id
            ));
        }
        summary
    }
}

fn tally(logs: &[Snapshot]) -> (BTreeMap<String, BTreeMap<String, u64>>, Vec<Deletion>) {
    let mut stats: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut deletions = Vec::new();
    for log in logs {
        let fields: &Fields = log.fields();
        let entity_type = str_field(fields, "entityType").unwrap_or("unknown");
        let action = str_field(fields, "action").unwrap_or(AuditAction::Update.as_str());
        *stats
            .entry(entity_type.to_owned())
            .or_default()
            .entry(action.to_owned())
            .or_default() += 1;

        if action == AuditAction::Delete.as_str() || action == AuditAction::DeleteConfirmed.as_str() {
            deletions.push(Deletion {
                entity_type: entity_type.to_owned(),
                document_id: str_field(fields, "documentId").unwrap_or(log.id()).to_owned(),
                actor: str_field(fields, "userId").map(str::to_owned),
                at: instant_field(fields, "timestamp"),
            });
        }
    }
    (stats, deletions)
}

#[async_trait]
impl ScheduledJob for AuditDigestJob {
    fn name(&self) -> &'static str {
        "audit_digest"
    }

    fn cadence(&self) -> Cadence {
        self.config.cadence
    }

    async fn run_tick(&self) -> Result<TickReport, Error> {
        let now = self.clock.utc();
        let since = now - self.config.lookback;
        let query = DocumentQuery::collection(AUDIT_LOGS)
            .at_or_after("timestamp", since)
            .limit(self.config.max_entries);
        let logs = self.store.query(&query).await.map_err(map_store_error)?;
        let (stats, deletions) = tally(&logs);
        let recipients = self.admin_emails().await?;

        let digest = AuditDigest {
            generated_at: now,
            summary: self.summarise(&stats, &deletions),
            recipients,
            stats,
            deletion_count: deletions.len(),
        };
        let fields = to_fields(&digest)
            .map_err(|error| Error::internal(format!("audit digest serialisation failed: {error}")))?;
        let path = self
            .store
            .add(AUDIT_DIGESTS, fields)
            .await
            .map_err(map_store_error)?;

        info!(
            digest = %path,
            entries = logs.len(),
            deletions = digest.deletion_count,
            recipients = digest.recipients.len(),
            "audit digest written"
        );
        Ok(TickReport {
            examined: logs.len(),
            written: 1,
            failed: 0,
        })
    }
}
