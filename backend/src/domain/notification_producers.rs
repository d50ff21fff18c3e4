//! Notification producers for tasks, schedule slots, invoices and vacation
//! requests.
//!
//! Each producer compares the fields its recipients care about and stays
//! quiet when a write leaves them unchanged, so bookkeeping writes by other
//! reactors never re-notify.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::Error;
use super::document::{DocumentChange, DocumentPath, Fields, resolve_instant, str_field, string_list};
use super::notification::{NotificationDraft, NotificationOutbox};
use super::reactor::{ChangeReactor, Reaction};

/// Invoice notifications address at most this many recipients.
pub const MAX_INVOICE_RECIPIENTS: usize = 50;

const TASK_WATCHED_FIELDS: &[&str] = &["title", "status", "priority", "dueAt", "assigneeIds"];
const SLOT_WATCHED_FIELDS: &[&str] = &["start", "end", "projectId", "assigneeIds"];

fn field_changed(before: Option<&Fields>, after: &Fields, names: &[&str]) -> bool {
    before.is_none_or(|previous| names.iter().any(|name| previous.get(*name) != after.get(*name)))
}

fn data_value(fields: &Fields, name: &str) -> Value {
    fields.get(name).cloned().unwrap_or(Value::Null)
}

fn display_instant(value: Option<&Value>, format: &str) -> String {
    match value {
        Some(raw) => resolve_instant(raw).map_or_else(
            || raw.as_str().unwrap_or("?").to_owned(),
            |instant| instant.format(format).to_string(),
        ),
        None => "?".to_owned(),
    }
}

async fn enqueue_all(
    outbox: &NotificationOutbox,
    reactor: &'static str,
    drafts: Vec<NotificationDraft>,
) -> Result<Reaction, Error> {
    let mut writes = 0;
    for draft in drafts {
        let path = outbox.enqueue(draft).await?;
        debug!(reactor, notification = %path, "notification produced");
        writes += 1;
    }
    Ok(Reaction::wrote(writes))
}

/// Notifies task assignees on creation and on relevant edits.
pub struct TaskNotifier {
    outbox: NotificationOutbox,
}

impl TaskNotifier {
    pub fn new(outbox: NotificationOutbox) -> Self {
        Self { outbox }
    }

    fn draft(change: &DocumentChange) -> Option<NotificationDraft> {
        let after = change.after()?;
        let recipients = string_list(after, "assigneeIds");
        if recipients.is_empty() || !field_changed(change.before(), after, TASK_WATCHED_FIELDS) {
            return None;
        }
        let title = if change.before().is_none() {
            "Neue Aufgabe"
        } else {
            "Aufgabe aktualisiert"
        };
        let body = str_field(after, "title").unwrap_or("Aufgabe aktualisiert");
        Some(
            NotificationDraft::new("task", change.path(), recipients, title, body)
                .with_data("status", data_value(after, "status"))
                .with_data("priority", data_value(after, "priority")),
        )
    }
}

#[async_trait]
impl ChangeReactor for TaskNotifier {
    fn name(&self) -> &'static str {
        "task_notifier"
    }

    async fn react(&self, change: &DocumentChange) -> Result<Reaction, Error> {
        enqueue_all(&self.outbox, self.name(), Self::draft(change).into_iter().collect()).await
    }
}

/// Notifies slot assignees when an appointment is created or moved.
pub struct ScheduleSlotNotifier {
    outbox: NotificationOutbox,
}

impl ScheduleSlotNotifier {
    pub fn new(outbox: NotificationOutbox) -> Self {
        Self { outbox }
    }

    fn draft(change: &DocumentChange) -> Option<NotificationDraft> {
        let after = change.after()?;
        let recipients = string_list(after, "assigneeIds");
        if recipients.is_empty() || !field_changed(change.before(), after, SLOT_WATCHED_FIELDS) {
            return None;
        }
        let project = str_field(after, "projectId").unwrap_or("?");
        let body = format!(
            "Projekt {project}: {} - {}",
            display_instant(after.get("start"), "%d.%m.%Y %H:%M"),
            display_instant(after.get("end"), "%d.%m.%Y %H:%M"),
        );
        Some(
            NotificationDraft::new("schedule", change.path(), recipients, "Termin aktualisiert", body)
                .with_data("projectId", data_value(after, "projectId")),
        )
    }
}

#[async_trait]
impl ChangeReactor for ScheduleSlotNotifier {
    fn name(&self) -> &'static str {
        "schedule_slot_notifier"
    }

    async fn react(&self, change: &DocumentChange) -> Result<Reaction, Error> {
        enqueue_all(&self.outbox, self.name(), Self::draft(change).into_iter().collect()).await
    }
}

/// Notifies invoice recipients when the invoice state changes.
pub struct InvoiceNotifier {
    outbox: NotificationOutbox,
}

impl InvoiceNotifier {
    pub fn new(outbox: NotificationOutbox) -> Self {
        Self { outbox }
    }

    fn state(fields: &Fields) -> Option<&str> {
        str_field(fields, "state").or_else(|| str_field(fields, "status"))
    }

    fn draft(change: &DocumentChange) -> Option<NotificationDraft> {
        let after = change.after()?;
        let mut recipients = string_list(after, "recipients");
        if recipients.is_empty() {
            recipients = string_list(after, "customerUserIds");
        }
        recipients.truncate(MAX_INVOICE_RECIPIENTS);
        if recipients.is_empty() {
            return None;
        }
        let state = Self::state(after);
        if change.before().is_some_and(|before| Self::state(before) == state) {
            return None;
        }
        let state = state.unwrap_or("unbekannt");
        let number = str_field(after, "number").unwrap_or(change.path().id());
        Some(
            NotificationDraft::new(
                "invoice",
                change.path(),
                recipients,
                "Rechnungsstatus aktualisiert",
                format!("Rechnung {number}: {state}"),
            )
            .with_data("state", Value::from(state)),
        )
    }
}

#[async_trait]
impl ChangeReactor for InvoiceNotifier {
    fn name(&self) -> &'static str {
        "invoice_notifier"
    }

    async fn react(&self, change: &DocumentChange) -> Result<Reaction, Error> {
        enqueue_all(&self.outbox, self.name(), Self::draft(change).into_iter().collect()).await
    }
}

/// Notifies an employee about each new or re-decided vacation request.
pub struct VacationRequestNotifier {
    outbox: NotificationOutbox,
}

impl VacationRequestNotifier {
    pub fn new(outbox: NotificationOutbox) -> Self {
        Self { outbox }
    }

    fn requests(fields: &Fields) -> Vec<&Fields> {
        fields
            .get("vacationRequests")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default()
    }

    fn drafts(change: &DocumentChange) -> Vec<NotificationDraft> {
        let Some(after) = change.after() else {
            return Vec::new();
        };
        let previous = change.before().map(Self::requests).unwrap_or_default();
        let employee: &DocumentPath = change.path();

        Self::requests(after)
            .into_iter()
            .filter(|request| {
                let id = request.get("id");
                let status = request.get("status");
                !previous
                    .iter()
                    .any(|old| old.get("id") == id && old.get("status") == status)
            })
            .map(|request| {
                let status = str_field(request, "status").unwrap_or("offen");
                let body = format!(
                    "{} - {}: {status}",
                    display_instant(request.get("start"), "%d.%m.%Y"),
                    display_instant(request.get("end"), "%d.%m.%Y"),
                );
                NotificationDraft::new(
                    "vacation",
                    employee,
                    vec![employee.id().to_owned()],
                    "Urlaubsantrag aktualisiert",
                    body,
                )
                .with_data("requestId", data_value(request, "id"))
                .with_data("status", data_value(request, "status"))
            })
            .collect()
    }
}

#[async_trait]
impl ChangeReactor for VacationRequestNotifier {
    fn name(&self) -> &'static str {
        "vacation_request_notifier"
    }

    async fn react(&self, change: &DocumentChange) -> Result<Reaction, Error> {
        enqueue_all(&self.outbox, self.name(), Self::drafts(change)).await
    }
}
