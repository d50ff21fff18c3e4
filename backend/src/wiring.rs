//! Assembles the trigger router and the scheduler from settings.
//!
//! Both binaries and the behaviour tests build their runtime through these
//! functions, so every subscription and job is declared once.

use std::sync::Arc;

use mockable::Clock;
use reqwest::Url;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::collections::{
    INVOICES, PERSONNEL, SCHEDULE_SLOTS, TASKS, TRACKED_COLLECTIONS, WORK_ORDERS,
};
use crate::domain::ports::{DocumentStore, PushGateway};
use crate::domain::{
    AuditDigestJob, AuditRecorder, CadenceParseError, ChangeKind, CommentCounter,
    DocumentNumberSequencer, Error, InvoiceNotifier, NotificationCleanup, NotificationDispatcher,
    NotificationOutbox, ReminderEvaluator, RetentionPurger, ScheduleSlotNotifier, TaskNotifier,
    TickReport, VacationRequestNotifier, WorkOrderReactor,
};
use crate::inbound::{ALL_CHANGES, DispatchReport, PathPatternError, Scheduler, TriggerRouter};
use crate::outbound::memory_store::ChangeFeed;
use crate::outbound::push::{HttpPushGateway, HttpPushIdentity, LogOnlyPushGateway};
use crate::settings::ReactorSettings;

/// Comment sub-documents of any parent document.
pub const COMMENT_PATTERN: &str = "{collection}/{docId}/comments/{commentId}";

const WRITES: &[ChangeKind] = &[ChangeKind::Create, ChangeKind::Update];
const COMMENT_CHANGES: &[ChangeKind] = &[ChangeKind::Create, ChangeKind::Delete];

/// Failures while assembling the runtime.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error(transparent)]
    Pattern(#[from] PathPatternError),
    #[error("push endpoint `{endpoint}` is not a valid URL: {message}")]
    Endpoint { endpoint: String, message: String },
    #[error("push client could not be built: {0}")]
    Client(#[from] reqwest::Error),
    #[error("job schedule is invalid: {0}")]
    Schedule(#[from] CadenceParseError),
}

/// Push gateway selected by the settings.
///
/// Without an endpoint, messages are logged instead of delivered.
pub fn push_gateway(settings: &ReactorSettings) -> Result<Arc<dyn PushGateway>, WiringError> {
    let Some(endpoint) = settings.push_endpoint() else {
        warn!("no push endpoint configured; notifications will only be logged");
        return Ok(Arc::new(LogOnlyPushGateway));
    };
    let url = Url::parse(endpoint).map_err(|error| WiringError::Endpoint {
        endpoint: endpoint.to_owned(),
        message: error.to_string(),
    })?;
    let identity = HttpPushIdentity {
        bearer_token: settings.push_token.clone(),
        user_agent: None,
    };
    let gateway = HttpPushGateway::new(url, settings.push_timeout(), identity)?;
    info!(endpoint, "push gateway configured");
    Ok(Arc::new(gateway))
}

/// Router with every change subscription registered.
pub fn build_router(
    store: &Arc<dyn DocumentStore>,
    clock: &Arc<dyn Clock>,
) -> Result<TriggerRouter, WiringError> {
    let outbox = NotificationOutbox::new(Arc::clone(store), Arc::clone(clock));
    let audit = Arc::new(AuditRecorder::new(Arc::clone(store), Arc::clone(clock)));

    let mut router = TriggerRouter::new();
    for (collection, _) in TRACKED_COLLECTIONS {
        router.subscribe(&format!("{collection}/{{id}}"), ALL_CHANGES, audit.clone())?;
    }
    router
        .subscribe(
            COMMENT_PATTERN,
            COMMENT_CHANGES,
            Arc::new(CommentCounter::new(Arc::clone(store))),
        )?
        .subscribe(
            &format!("{WORK_ORDERS}/{{id}}"),
            WRITES,
            Arc::new(WorkOrderReactor::new(
                Arc::clone(store),
                outbox.clone(),
                Arc::clone(clock),
            )),
        )?
        .subscribe(
            &format!("{TASKS}/{{id}}"),
            WRITES,
            Arc::new(TaskNotifier::new(outbox.clone())),
        )?
        .subscribe(
            &format!("{SCHEDULE_SLOTS}/{{id}}"),
            WRITES,
            Arc::new(ScheduleSlotNotifier::new(outbox.clone())),
        )?
        .subscribe(
            &format!("{INVOICES}/{{id}}"),
            WRITES,
            Arc::new(InvoiceNotifier::new(outbox.clone())),
        )?
        .subscribe(
            &format!("{PERSONNEL}/{{empId}}"),
            WRITES,
            Arc::new(VacationRequestNotifier::new(outbox)),
        )?;
    Ok(router)
}

/// Scheduler with every periodic job registered.
pub fn build_scheduler(
    store: &Arc<dyn DocumentStore>,
    gateway: Arc<dyn PushGateway>,
    clock: &Arc<dyn Clock>,
    settings: &ReactorSettings,
) -> Result<Scheduler, WiringError> {
    let mut scheduler = Scheduler::new(Arc::clone(clock));
    scheduler
        .register(Arc::new(ReminderEvaluator::new(
            Arc::clone(store),
            Arc::clone(clock),
            settings.reminder_config(),
        )))
        .register(Arc::new(NotificationDispatcher::new(
            Arc::clone(store),
            gateway,
            Arc::clone(clock),
            settings.dispatcher_config(),
        )))
        .register(Arc::new(RetentionPurger::new(
            Arc::clone(store),
            Arc::clone(clock),
            settings.retention_config()?,
        )))
        .register(Arc::new(NotificationCleanup::new(
            Arc::clone(store),
            Arc::clone(clock),
            settings.cleanup_config()?,
        )))
        .register(Arc::new(AuditDigestJob::new(
            Arc::clone(store),
            Arc::clone(clock),
            settings.digest_config()?,
        )));
    Ok(scheduler)
}

/// Document-number sequencer configured from the settings.
pub fn build_sequencer(
    store: &Arc<dyn DocumentStore>,
    clock: &Arc<dyn Clock>,
    settings: &ReactorSettings,
) -> DocumentNumberSequencer {
    DocumentNumberSequencer::new(Arc::clone(store), Arc::clone(clock), settings.sequencer_config())
}

/// Run `job` once, then route every change it caused through `router`.
///
/// The job's error is returned only after its partial writes were routed.
pub async fn run_job_and_route(
    scheduler: &Scheduler,
    router: &TriggerRouter,
    changes: &mut ChangeFeed,
    job: &str,
) -> Result<(TickReport, DispatchReport), Error> {
    let outcome = scheduler.run_once(job).await;
    let routed = router.drain(changes).await;
    outcome.map(|report| (report, routed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentChange, DocumentPath, Fields};
    use crate::outbound::memory_store::InMemoryDocumentStore;
    use crate::test_support::MutableClock;
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};

    #[fixture]
    fn runtime() -> (Arc<dyn DocumentStore>, Arc<dyn Clock>) {
        let clock = MutableClock::new(
            Utc.with_ymd_and_hms(2025, 1, 2, 2, 0, 0)
                .single()
                .expect("valid time"),
        );
        (Arc::new(InMemoryDocumentStore::new()), Arc::new(clock))
    }

    fn created(path: &str) -> DocumentChange {
        DocumentChange::new(DocumentPath::parse(path).expect("path"), None, Some(Fields::new()))
    }

    #[rstest]
    #[case::project("projects/p1", vec!["audit_recorder"])]
    #[case::punch("punches/x1", vec!["audit_recorder"])]
    #[case::task("tasks/t1", vec!["audit_recorder", "task_notifier"])]
    #[case::work_order("workOrders/w1", vec!["audit_recorder", "work_order_notifier"])]
    #[case::comment("project_documents/d1/comments/c1", vec!["comment_counter"])]
    #[case::slot("scheduleSlots/s1", vec!["schedule_slot_notifier"])]
    #[case::untracked("notifications/n1", vec![])]
    fn router_routes_each_collection(
        runtime: (Arc<dyn DocumentStore>, Arc<dyn Clock>),
        #[case] path: &str,
        #[case] expected: Vec<&'static str>,
    ) {
        let (store, clock) = runtime;
        let router = build_router(&store, &clock).expect("router");
        assert_eq!(router.matching(&created(path)), expected);
    }

    #[rstest]
    fn scheduler_registers_every_job(runtime: (Arc<dyn DocumentStore>, Arc<dyn Clock>)) {
        let (store, clock) = runtime;
        let scheduler = build_scheduler(
            &store,
            Arc::new(LogOnlyPushGateway),
            &clock,
            &settings(None),
        )
        .expect("scheduler");
        assert_eq!(
            scheduler.job_names(),
            vec![
                "task_reminders",
                "notification_dispatcher",
                "retention_purge",
                "notification_cleanup",
                "audit_digest",
            ]
        );
    }

    fn settings(endpoint: Option<&str>) -> ReactorSettings {
        ReactorSettings {
            push_endpoint: endpoint.map(str::to_owned),
            ..ReactorSettings::default()
        }
    }

    #[rstest]
    fn malformed_schedules_are_reported(runtime: (Arc<dyn DocumentStore>, Arc<dyn Clock>)) {
        let (store, clock) = runtime;
        let settings = ReactorSettings {
            digest_schedule: Some("every fortnight".to_owned()),
            ..ReactorSettings::default()
        };

        let error = build_scheduler(&store, Arc::new(LogOnlyPushGateway), &clock, &settings)
            .err()
            .expect("invalid schedule");
        assert!(matches!(error, WiringError::Schedule(_)));
    }

    #[rstest]
    fn malformed_endpoints_are_reported() {
        let error = push_gateway(&settings(Some("not a url"))).err().expect("invalid endpoint");
        assert!(matches!(error, WiringError::Endpoint { .. }));
    }

    #[rstest]
    fn endpoints_select_the_http_gateway() {
        assert!(push_gateway(&settings(Some("https://push.invalid/v1/send"))).is_ok());
        assert!(push_gateway(&settings(None)).is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn routed_job_runs_audit_the_writes_they_cause(runtime: (Arc<dyn DocumentStore>, Arc<dyn Clock>)) {
        let memory = Arc::new(InMemoryDocumentStore::new());
        let mut expired = Fields::new();
        expired.insert("toBeDeletedAt".to_owned(), serde_json::json!("2025-01-01T00:00:00Z"));
        memory
            .seed(DocumentPath::new("projects", "p1"), expired)
            .expect("seed");
        let store: Arc<dyn DocumentStore> = memory.clone();
        let (_, clock) = runtime;
        let router = build_router(&store, &clock).expect("router");
        let mut changes = memory.subscribe().expect("subscribe");
        let scheduler = build_scheduler(&store, Arc::new(LogOnlyPushGateway), &clock, &settings(None))
            .expect("scheduler");

        let (report, routed) = run_job_and_route(&scheduler, &router, &mut changes, "retention_purge")
            .await
            .expect("purge");

        assert_eq!(report.written, 1);
        assert_eq!(routed, DispatchReport { invoked: 1, failed: 0 });
        let mut actions: Vec<String> = memory
            .documents_in(crate::domain::collections::AUDIT_LOGS)
            .expect("audit logs")
            .iter()
            .filter_map(|entry| entry.fields().get("action")?.as_str().map(str::to_owned))
            .collect();
        actions.sort();
        assert_eq!(actions, vec!["DELETE_CONFIRMED", "delete"]);
    }
}
