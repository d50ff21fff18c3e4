//! Work-order completion stamping and assignment notifications.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::Error;
use super::document::{
    DocumentChange, DocumentPath, Fields, instant_field, is_unset, str_field, string_list,
    timestamp_value,
};
use super::mapping::map_store_error;
use super::notification::{NotificationDraft, NotificationOutbox};
use super::ports::DocumentStore;
use super::reactor::{ChangeReactor, Reaction};

/// Topic of assignment notifications.
pub const WORK_ORDER_ASSIGNED: &str = "workorder.assigned";

const COMPLETED: &str = "completed";
const NO_DUE_DATE: &str = "Kein Fälligkeitsdatum";
/// Compare-and-set attempts for the completion stamp.
const STAMP_ATTEMPTS: u32 = 4;

/// Order-independent key of an assignee list.
///
/// # Examples
/// ```
/// use reactors::domain::assignee_key;
///
/// let a = assignee_key(&["u2".to_owned(), "u1".to_owned()]);
/// let b = assignee_key(&["u1".to_owned(), "u2".to_owned()]);
/// assert_eq!(a, b);
/// assert_eq!(a, "u1,u2");
/// ```
pub fn assignee_key(assignees: &[String]) -> String {
    let mut sorted: Vec<&str> = assignees.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

fn assignment_title(order: &Fields, order_id: &str) -> String {
    let label = match (str_field(order, "title"), order_number(order)) {
        (Some(title), Some(number)) => format!("{title} ({number})"),
        (Some(title), None) => title.to_owned(),
        (None, Some(number)) => number,
        (None, None) => order_id.to_owned(),
    };
    format!("Arbeitsauftrag zugewiesen: {label}")
}

fn order_number(order: &Fields) -> Option<String> {
    match order.get("orderNumber")? {
        Value::String(number) if !number.trim().is_empty() => Some(number.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn assignment_body(due_date: Option<DateTime<Utc>>) -> String {
    due_date.map_or_else(
        || NO_DUE_DATE.to_owned(),
        |due| format!("Fällig am {}", due.format("%d.%m.%Y")),
    )
}

/// Change reactor for `workOrders/{id}` writes.
///
/// Stamps `completedAt` the first time a work order is seen completed and
/// notifies assignees when the assignee set changes.
pub struct WorkOrderReactor {
    store: Arc<dyn DocumentStore>,
    outbox: NotificationOutbox,
    clock: Arc<dyn Clock>,
}

impl WorkOrderReactor {
    pub fn new(store: Arc<dyn DocumentStore>, outbox: NotificationOutbox, clock: Arc<dyn Clock>) -> Self {
        Self { store, outbox, clock }
    }

    /// Whether the written state still lacks its completion stamp.
    fn needs_completion_stamp(fields: &Fields) -> bool {
        str_field(fields, "status") == Some(COMPLETED) && is_unset(fields, "completedAt")
    }

    /// Stamp `completedAt` unless the stored work order already carries one.
    ///
    /// The stored document is re-read and replaced through compare-and-set,
    /// so replayed changes and concurrent writers never move the stamp.
    async fn stamp_completion(&self, path: &DocumentPath, now: DateTime<Utc>) -> Result<bool, Error> {
        for attempt in 1..=STAMP_ATTEMPTS {
            let Some(current) = self.store.get(path).await.map_err(map_store_error)? else {
                return Ok(false);
            };
            let version = current.version();
            let mut fields = current.into_fields();
            if !Self::needs_completion_stamp(&fields) {
                return Ok(false);
            }
            fields.insert("completedAt".to_owned(), timestamp_value(now));

            match self.store.compare_and_set(path, Some(version), fields).await {
                Ok(()) => return Ok(true),
                Err(error) if error.is_conflict() => {
                    debug!(work_order = %path, attempt, "work order changed while stamping; retrying");
                }
                Err(error) => return Err(map_store_error(error)),
            }
        }
        warn!(work_order = %path, attempts = STAMP_ATTEMPTS, "completion stamp attempts exhausted");
        Err(Error::conflict(format!(
            "work order {path} kept changing after {STAMP_ATTEMPTS} attempts"
        )))
    }

    fn assignment_draft(change: &DocumentChange, after: &Fields) -> Option<NotificationDraft> {
        let assignees = string_list(after, "assignedUsers");
        if assignees.is_empty() {
            return None;
        }
        let previous = change
            .before()
            .map(|before| string_list(before, "assignedUsers"))
            .unwrap_or_default();
        if assignee_key(&previous) == assignee_key(&assignees) {
            return None;
        }

        let path = change.path();
        let due_date = instant_field(after, "dueDate");
        let mut draft = NotificationDraft::new(
            WORK_ORDER_ASSIGNED,
            path,
            assignees,
            assignment_title(after, path.id()),
            assignment_body(due_date),
        );
        if let Some(number) = order_number(after) {
            draft = draft.with_data("orderNumber", Value::String(number));
        }
        if let Some(due) = due_date {
            draft = draft.with_data("dueDate", timestamp_value(due));
        }
        Some(draft)
    }
}

#[async_trait]
impl ChangeReactor for WorkOrderReactor {
    fn name(&self) -> &'static str {
        "work_order_notifier"
    }

    async fn react(&self, change: &DocumentChange) -> Result<Reaction, Error> {
        let Some(after) = change.after() else {
            return Ok(Reaction::skipped());
        };
        let now = self.clock.utc();
        let mut writes = 0;

        if Self::needs_completion_stamp(after) && self.stamp_completion(change.path(), now).await? {
            debug!(work_order = %change.path(), "completion stamped");
            writes += 1;
        }

        if let Some(draft) = Self::assignment_draft(change, after) {
            let notification = self.outbox.enqueue(draft).await?;
            info!(
                work_order = %change.path(),
                notification = %notification,
                "assignment notification queued"
            );
            writes += 1;
        }
        Ok(Reaction::wrote(writes))
    }
}
