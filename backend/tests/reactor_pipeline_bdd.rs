//! Behaviour-driven tests for the wired reactor pipeline.
//!
//! Scenarios write through the in-memory store, route every resulting change
//! through the production trigger router and run scheduled jobs by name, so
//! each one exercises the same wiring as the service binary.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use mockable::Clock;
use reactors::domain::collections::{AUDIT_LOGS, NOTIFICATIONS};
use reactors::domain::ports::{DocumentStore, PushGateway};
use reactors::domain::{DocumentPath, Fields};
use reactors::inbound::TriggerRouter;
use reactors::outbound::memory_store::{ChangeFeed, InMemoryDocumentStore};
use reactors::settings::ReactorSettings;
use reactors::test_support::{MutableClock, RecordingPushGateway};
use reactors::wiring::{build_router, build_scheduler, build_sequencer};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, scenario, then, when};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

// -----------------------------------------------------------------------------
// Test World
// -----------------------------------------------------------------------------

/// Wrapper for non-Clone runtime handle.
#[derive(Clone)]
struct RuntimeHandle(Arc<Runtime>);

#[derive(Clone)]
struct FeedHandle(Arc<Mutex<ChangeFeed>>);

#[derive(Default, ScenarioState)]
struct ReactorPipelineWorld {
    runtime: Slot<RuntimeHandle>,
    memory: Slot<Arc<InMemoryDocumentStore>>,
    clock: Slot<Arc<MutableClock>>,
    gateway: Slot<Arc<RecordingPushGateway>>,
    router: Slot<Arc<TriggerRouter>>,
    feed: Slot<FeedHandle>,
    issued_numbers: Slot<Vec<String>>,
}

impl ReactorPipelineWorld {
    fn start(&self, now: DateTime<Utc>) {
        let runtime = Runtime::new().expect("create runtime");
        let memory = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(MutableClock::new(now));
        let store: Arc<dyn DocumentStore> = memory.clone();
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let router = build_router(&store, &dyn_clock).expect("router");

        self.feed.set(FeedHandle(Arc::new(Mutex::new(memory.subscribe().expect("subscribe")))));
        self.runtime.set(RuntimeHandle(Arc::new(runtime)));
        self.memory.set(memory);
        self.clock.set(clock);
        self.gateway.set(Arc::new(RecordingPushGateway::default()));
        self.router.set(Arc::new(router));
    }

    fn runtime(&self) -> Arc<Runtime> {
        self.runtime.get().expect("runtime should be set").0
    }

    fn memory(&self) -> Arc<InMemoryDocumentStore> {
        self.memory.get().expect("store should be set")
    }

    fn store(&self) -> Arc<dyn DocumentStore> {
        self.memory()
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.get().expect("clock should be set")
    }

    /// Route every pending change, including changes the reactors cause.
    fn settle(&self) {
        let router = self.router.get().expect("router should be set");
        let feed = self.feed.get().expect("feed should be set");
        let runtime = self.runtime();
        let mut receiver = feed.0.lock().expect("feed mutex");
        runtime.block_on(router.drain(&mut receiver));
    }

    fn write(&self, path: &str, fields: Value) {
        let store = self.store();
        let document = DocumentPath::parse(path).expect("path");
        self.runtime()
            .block_on(store.set(&document, object(fields)))
            .expect("write document");
        self.settle();
    }

    fn delete(&self, path: &str) {
        let store = self.store();
        let document = DocumentPath::parse(path).expect("path");
        self.runtime()
            .block_on(store.delete(&document))
            .expect("delete document");
        self.settle();
    }

    fn seed(&self, path: &str, fields: Value) {
        self.memory()
            .seed(DocumentPath::parse(path).expect("path"), object(fields))
            .expect("seed document");
    }

    fn fields(&self, path: &str) -> Option<Fields> {
        let document = DocumentPath::parse(path).expect("path");
        self.runtime()
            .block_on(self.store().get(&document))
            .expect("read document")
            .map(|snapshot| snapshot.into_fields())
    }

    fn collection(&self, name: &str) -> Vec<Fields> {
        self.memory()
            .documents_in(name)
            .expect("list collection")
            .into_iter()
            .map(|snapshot| snapshot.into_fields())
            .collect()
    }

    fn run_job(&self, name: &str) {
        let gateway: Arc<dyn PushGateway> = self.gateway.get().expect("gateway should be set");
        let scheduler = build_scheduler(
            &self.store(),
            gateway,
            &self.clock(),
            &ReactorSettings::default(),
        )
        .expect("scheduler should build");
        self.runtime()
            .block_on(scheduler.run_once(name))
            .expect("job should finish");
        self.settle();
    }
}

fn object(value: Value) -> Fields {
    value.as_object().cloned().expect("object literal")
}

fn list(raw: &str) -> Vec<String> {
    let mut items: Vec<String> = raw
        .trim_matches('"')
        .split(',')
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect();
    items.sort();
    items
}

fn instant(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw.trim_matches('"'))
        .expect("RFC 3339 instant")
        .with_timezone(&Utc)
}

fn text(fields: &Fields, name: &str) -> Option<String> {
    fields.get(name).and_then(Value::as_str).map(str::to_owned)
}

#[fixture]
fn world() -> ReactorPipelineWorld {
    ReactorPipelineWorld::default()
}

// -----------------------------------------------------------------------------
// Given Steps
// -----------------------------------------------------------------------------

#[given("a reactor runtime at {now}")]
fn a_reactor_runtime_at(world: &ReactorPipelineWorld, now: String) {
    world.start(instant(&now));
}

#[given("a task {id} with status {status} due at {due}")]
fn a_task_with_status_due_at(world: &ReactorPipelineWorld, id: String, status: String, due: String) {
    world.seed(
        &format!("tasks/{id}"),
        json!({ "title": format!("Aufgabe {id}"), "status": status, "dueAt": due }),
    );
}

#[given("a project document {id}")]
fn a_project_document(world: &ReactorPipelineWorld, id: String) {
    world.seed(&format!("project_documents/{id}"), json!({ "name": "Plan" }));
}

#[given("a work order {id} without assignees")]
fn a_work_order_without_assignees(world: &ReactorPipelineWorld, id: String) {
    world.write(
        &format!("workOrders/{id}"),
        json!({ "title": "Heizung", "orderNumber": "WO-7", "status": "open", "assignedUsers": [] }),
    );
}

#[given("the push gateway cannot reach {topic}")]
fn the_push_gateway_cannot_reach(world: &ReactorPipelineWorld, topic: String) {
    world
        .gateway
        .get()
        .expect("gateway should be set")
        .fail_topic(&topic);
}

#[given("a project {id} marked for deletion at {at}")]
fn a_project_marked_for_deletion_at(world: &ReactorPipelineWorld, id: String, at: String) {
    world.seed(
        &format!("projects/{id}"),
        json!({ "name": format!("Projekt {id}"), "toBeDeletedAt": at }),
    );
}

// -----------------------------------------------------------------------------
// When Steps
// -----------------------------------------------------------------------------

#[when("the {job} job runs")]
fn the_job_runs(world: &ReactorPipelineWorld, job: String) {
    world.run_job(&job);
}

#[when("{count} comments are added to {id}")]
fn comments_are_added_to(world: &ReactorPipelineWorld, count: usize, id: String) {
    for index in 0..count {
        world.write(
            &format!("project_documents/{id}/comments/c{index}"),
            json!({ "text": "Bitte prüfen" }),
        );
    }
}

#[when("1 comment is deleted from {id}")]
fn one_comment_is_deleted_from(world: &ReactorPipelineWorld, id: String) {
    world.delete(&format!("project_documents/{id}/comments/c0"));
}

#[when("work order {id} is assigned to {users}")]
fn work_order_is_assigned_to(world: &ReactorPipelineWorld, id: String, users: String) {
    let path = format!("workOrders/{id}");
    let mut fields = world.fields(&path).expect("work order should exist");
    let assignees: Vec<Value> = users
        .split(',')
        .map(|user| Value::String(user.trim().to_owned()))
        .collect();
    fields.insert("assignedUsers".to_owned(), Value::Array(assignees));
    world.write(&path, Value::Object(fields));
}

#[when("project {id} is created, renamed and deleted")]
fn project_is_created_renamed_and_deleted(world: &ReactorPipelineWorld, id: String) {
    let path = format!("projects/{id}");
    world.write(&path, json!({ "name": "Rohbau", "userId": "U1" }));
    world.write(&path, json!({ "name": "Rohbau Nord", "userId": "U1" }));
    world.delete(&path);
}

#[when("{count} invoice numbers are issued")]
fn invoice_numbers_are_issued(world: &ReactorPipelineWorld, count: usize) {
    let sequencer = build_sequencer(&world.store(), &world.clock(), &ReactorSettings::default());
    let runtime = world.runtime();
    let numbers = (0..count)
        .map(|_| {
            runtime
                .block_on(sequencer.next_number("invoice"))
                .expect("number should be issued")
        })
        .collect();
    world.issued_numbers.set(numbers);
}

// -----------------------------------------------------------------------------
// Then Steps
// -----------------------------------------------------------------------------

#[then("task {id} has status {status}")]
fn task_has_status(world: &ReactorPipelineWorld, id: String, status: String) {
    let task = world.fields(&format!("tasks/{id}")).expect("task should exist");
    assert_eq!(text(&task, "status"), Some(status));
}

#[then("{id} has a comment count of {count}")]
fn has_a_comment_count_of(world: &ReactorPipelineWorld, id: String, count: i64) {
    let parent = world
        .fields(&format!("project_documents/{id}"))
        .expect("parent should exist");
    assert_eq!(parent.get("commentCount").and_then(Value::as_i64), Some(count));
}

#[then("{count} workorder.assigned notification is queued")]
fn workorder_assigned_notifications_are_queued(world: &ReactorPipelineWorld, count: usize) {
    let queued = world
        .collection(NOTIFICATIONS)
        .into_iter()
        .filter(|notification| text(notification, "type").as_deref() == Some("workorder.assigned"))
        .filter(|notification| text(notification, "status").as_deref() == Some("queued"))
        .count();
    assert_eq!(queued, count);
}

#[then("push messages were sent to {topics}")]
fn push_messages_were_sent_to(world: &ReactorPipelineWorld, topics: String) {
    let mut sent: Vec<String> = world
        .gateway
        .get()
        .expect("gateway should be set")
        .sent()
        .into_iter()
        .map(|message| message.topic)
        .collect();
    sent.sort();
    assert_eq!(sent, list(&topics));
}

#[then("every notification has status {status}")]
fn every_notification_has_status(world: &ReactorPipelineWorld, status: String) {
    let notifications = world.collection(NOTIFICATIONS);
    assert!(!notifications.is_empty(), "notifications should exist");
    for notification in notifications {
        assert_eq!(text(&notification, "status").as_deref(), Some(status.as_str()));
    }
}

#[then("the audit log for {path} records {actions}")]
fn the_audit_log_records(world: &ReactorPipelineWorld, path: String, actions: String) {
    let document = DocumentPath::parse(&path).expect("path");
    let mut recorded: Vec<String> = world
        .collection(AUDIT_LOGS)
        .into_iter()
        .filter(|entry| text(entry, "entityType").as_deref() == Some(document.collection()))
        .filter(|entry| text(entry, "documentId").as_deref() == Some(document.id()))
        .filter_map(|entry| text(&entry, "action"))
        .collect();
    recorded.sort();
    assert_eq!(recorded, list(&actions));
}

#[then("project {id} no longer exists")]
fn project_no_longer_exists(world: &ReactorPipelineWorld, id: String) {
    assert!(world.fields(&format!("projects/{id}")).is_none());
}

#[then("project {id} still exists")]
fn project_still_exists(world: &ReactorPipelineWorld, id: String) {
    assert!(world.fields(&format!("projects/{id}")).is_some());
}

#[then("the issued numbers are {numbers}")]
fn the_issued_numbers_are(world: &ReactorPipelineWorld, numbers: String) {
    let issued = world.issued_numbers.get().expect("numbers should be issued");
    assert_eq!(issued, list(&numbers));
}

// -----------------------------------------------------------------------------
// Scenarios
// -----------------------------------------------------------------------------

#[scenario(
    path = "tests/features/reactor_pipeline.feature",
    name = "Overdue tasks are blocked by the reminder tick"
)]
fn overdue_tasks_are_blocked(world: ReactorPipelineWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/reactor_pipeline.feature",
    name = "Comment counts follow comment creation and deletion"
)]
fn comment_counts_follow_comments(world: ReactorPipelineWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/reactor_pipeline.feature",
    name = "Assigning a work order notifies its assignees once"
)]
fn work_order_assignment_notifies_once(world: ReactorPipelineWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/reactor_pipeline.feature",
    name = "Undeliverable notifications are marked as failed"
)]
fn undeliverable_notifications_fail(world: ReactorPipelineWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/reactor_pipeline.feature",
    name = "Every write to a tracked document is audited"
)]
fn tracked_writes_are_audited(world: ReactorPipelineWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/reactor_pipeline.feature",
    name = "Soft-deleted documents are purged once their deadline passes"
)]
fn soft_deleted_documents_are_purged(world: ReactorPipelineWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/reactor_pipeline.feature",
    name = "Document numbers are issued in sequence"
)]
fn document_numbers_are_issued_in_sequence(world: ReactorPipelineWorld) {
    drop(world);
}
