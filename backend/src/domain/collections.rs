//! Collection names shared with the application's clients.

pub const AUDIT_LOGS: &str = "auditLogs";
pub const AUDIT_DIGESTS: &str = "auditDigests";
pub const COUNTERS: &str = "counters";
pub const NOTIFICATIONS: &str = "notifications";
pub const TASKS: &str = "tasks";
pub const WORK_ORDERS: &str = "workOrders";
pub const INVOICES: &str = "invoices";
pub const PERSONNEL: &str = "personnel";
pub const SCHEDULE_SLOTS: &str = "scheduleSlots";
pub const PROJECT_DOCUMENTS: &str = "project_documents";
pub const USERS: &str = "users";

/// Collections under audit, paired with the entity type recorded for them.
///
/// Punches are time entries in the audit trail.
pub const TRACKED_COLLECTIONS: &[(&str, &str)] = &[
    ("projects", "projects"),
    ("materials", "materials"),
    (PERSONNEL, "personnel"),
    ("clients", "clients"),
    (INVOICES, "invoices"),
    (TASKS, "tasks"),
    ("punches", "timeEntries"),
    (WORK_ORDERS, "workOrders"),
];

/// Entity type recorded in audit entries for a collection path.
///
/// Untracked collections record under their own name.
///
/// # Examples
/// ```
/// use reactors::domain::collections::entity_type_for;
///
/// assert_eq!(entity_type_for("punches"), "timeEntries");
/// assert_eq!(entity_type_for("tasks"), "tasks");
/// assert_eq!(entity_type_for("project_documents"), "project_documents");
/// ```
pub fn entity_type_for(collection: &str) -> &str {
    TRACKED_COLLECTIONS
        .iter()
        .find(|(name, _)| *name == collection)
        .map_or(collection, |(_, entity_type)| *entity_type)
}
