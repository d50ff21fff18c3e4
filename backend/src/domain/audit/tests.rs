//! Unit tests for audit entry classification and recording.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::{AuditAction, AuditEntry, AuditRecorder};
use crate::domain::collections::AUDIT_LOGS;
use crate::domain::document::{DocumentChange, DocumentPath, Fields, to_fields};
use crate::domain::ports::{DocumentStoreError, MockDocumentStore};
use crate::domain::reactor::ChangeReactor;
use crate::domain::ErrorCode;
use crate::outbound::memory_store::InMemoryDocumentStore;
use crate::test_support::MutableClock;

#[fixture]
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 2, 2, 0, 0)
        .single()
        .expect("valid time")
}

fn fields(value: Value) -> Fields {
    to_fields(&value).expect("object fixture")
}

fn change(collection: &str, before: Option<Value>, after: Option<Value>) -> DocumentChange {
    DocumentChange::new(
        DocumentPath::new(collection, "doc-1"),
        before.map(fields),
        after.map(fields),
    )
}

#[rstest]
#[case(None, Some(json!({"title": "A"})), AuditAction::Create)]
#[case(Some(json!({"title": "A"})), None, AuditAction::Delete)]
#[case(Some(json!({"title": "A"})), Some(json!({"title": "B"})), AuditAction::Update)]
fn action_follows_snapshot_existence(
    now: DateTime<Utc>,
    #[case] before: Option<Value>,
    #[case] after: Option<Value>,
    #[case] expected: AuditAction,
) {
    let entry = AuditEntry::for_change(&change("projects", before, after), now);
    assert_eq!(entry.action, expected);
}

#[rstest]
#[case("punches", "timeEntries")]
#[case("workOrders", "workOrders")]
#[case("clients", "clients")]
fn entity_type_follows_collection(now: DateTime<Utc>, #[case] collection: &str, #[case] expected: &str) {
    let entry = AuditEntry::for_change(&change(collection, None, Some(json!({}))), now);
    assert_eq!(entry.entity_type, expected);
}

#[rstest]
fn actor_prefers_after_then_before_then_trigger(now: DateTime<Utc>) {
    let from_after = change(
        "tasks",
        Some(json!({"userId": "before", "userEmail": "b@example.com"})),
        Some(json!({"userId": "after"})),
    );
    let entry = AuditEntry::for_change(&from_after, now);
    assert_eq!(entry.user_id.as_deref(), Some("after"));
    assert_eq!(entry.user_email.as_deref(), Some("b@example.com"));

    let from_trigger = change("tasks", None, Some(json!({"title": "x"}))).with_actor("caller");
    let entry = AuditEntry::for_change(&from_trigger, now);
    assert_eq!(entry.user_id.as_deref(), Some("caller"));
    assert!(entry.user_email.is_none());
}

#[rstest]
fn details_keep_only_summary_fields(now: DateTime<Utc>) {
    let entry = AuditEntry::for_change(
        &change(
            "projects",
            None,
            Some(json!({
                "title": "Roof",
                "status": "active",
                "projectId": null,
                "concernID": "c1",
                "budget": 1200
            })),
        ),
        now,
    );
    assert_eq!(
        Value::Object(entry.details),
        json!({"title": "Roof", "status": "active", "concernID": "c1"})
    );
}

#[rstest]
fn entries_serialise_with_wire_names(now: DateTime<Utc>) {
    let entry = AuditEntry::delete_confirmed(&DocumentPath::new("invoices", "i1"), now);
    let serialised = serde_json::to_value(&entry).expect("serialise");
    assert_eq!(
        serialised,
        json!({
            "entityType": "invoices",
            "documentId": "i1",
            "action": "DELETE_CONFIRMED",
            "timestamp": "2025-01-02T02:00:00.000Z",
            "userId": null,
            "userEmail": null,
            "details": {},
            "previousValue": null,
            "newValue": null
        })
    );
}

#[rstest]
#[tokio::test]
async fn replaying_a_change_appends_two_entries(now: DateTime<Utc>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let recorder = AuditRecorder::new(store.clone(), Arc::new(MutableClock::new(now)));
    let update = change("tasks", Some(json!({"status": "todo"})), Some(json!({"status": "done"})));

    recorder.react(&update).await.expect("first delivery");
    recorder.react(&update).await.expect("second delivery");

    let logs = store.documents_in(AUDIT_LOGS).expect("audit logs");
    assert_eq!(logs.len(), 2);
    assert!(
        logs.iter()
            .all(|log| log.fields().get("action") == Some(&json!("update")))
    );
}

#[rstest]
#[tokio::test]
async fn store_failures_propagate(now: DateTime<Utc>) {
    let mut store = MockDocumentStore::new();
    store
        .expect_add()
        .times(1)
        .returning(|_, _| Err(DocumentStoreError::unavailable("offline")));
    let recorder = AuditRecorder::new(Arc::new(store), Arc::new(MutableClock::new(now)));

    let error = recorder
        .react(&change("tasks", None, Some(json!({}))))
        .await
        .expect_err("store failure surfaces");
    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}
