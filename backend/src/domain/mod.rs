//! Domain primitives, reactors and scheduled jobs.
//!
//! Purpose: react to writes on the shared document store and run the periodic
//! bookkeeping jobs (reminders, notification dispatch, retention, digests).
//! Everything here talks to the outside world through the traits in
//! [`ports`]; adapters live under `outbound`.
//!
//! Public surface:
//! - Error (alias to `error::DomainError`) - transport-agnostic failure.
//! - ErrorCode (alias to `error::ErrorCode`) - stable error identifier.
//! - ChangeReactor / ScheduledJob - the two handler contracts.
//! - One reactor or job type per bookkeeping concern.

pub mod audit;
pub mod collections;
pub mod comment_counter;
pub mod document;
pub mod error;
pub(crate) mod mapping;
pub mod notification;
pub mod notification_dispatcher;
pub mod notification_producers;
pub mod ports;
pub mod reactor;
pub mod reminders;
pub mod retention;
pub mod schedule;
pub mod sequencer;
pub mod work_order;

pub use self::audit::{AuditAction, AuditDigestConfig, AuditDigestJob, AuditEntry, AuditRecorder};
pub use self::comment_counter::{COMMENT_COUNT_FIELD, CommentCounter};
pub use self::document::{
    ChangeKind, DocumentChange, DocumentPath, DocumentPathError, Fields, Snapshot, resolve_instant,
};
pub use self::error::{DomainError, DomainError as Error, ErrorCode};
pub use self::notification::{
    NotificationDraft, NotificationOutbox, NotificationRecord, NotificationStatus,
};
pub use self::notification_dispatcher::{DispatcherConfig, NotificationDispatcher, recipient_topic};
pub use self::notification_producers::{
    InvoiceNotifier, MAX_INVOICE_RECIPIENTS, ScheduleSlotNotifier, TaskNotifier,
    VacationRequestNotifier,
};
pub use self::reactor::{ChangeReactor, Reaction, ScheduledJob, TickReport};
pub use self::reminders::{ACTIVE_TASK_STATUSES, ReminderConfig, ReminderEvaluator, is_overdue};
pub use self::retention::{
    NotificationCleanup, NotificationCleanupConfig, RetentionConfig, RetentionPurger,
    default_purge_collections, is_older_than,
};
pub use self::schedule::{Cadence, CadenceParseError};
pub use self::sequencer::{DocumentNumberSequencer, SequencerConfig, format_document_number};
pub use self::work_order::{WORK_ORDER_ASSIGNED, WorkOrderReactor, assignee_key};

/// Convenient domain result alias.
///
/// # Examples
/// ```
/// use reactors::domain::{DomainResult, Error};
///
/// fn reserve() -> DomainResult<String> {
///     Err(Error::conflict("counter raced"))
/// }
/// assert!(reserve().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
