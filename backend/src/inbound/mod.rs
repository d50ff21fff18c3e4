//! Inbound adapters translating change-feed events and timer ticks into
//! reactor calls while keeping runtime details at the edge.
//!
//! Change events are routed by [`triggers`]; periodic jobs are driven by
//! [`scheduler`].

pub mod path_pattern;
pub mod scheduler;
pub mod triggers;

pub use path_pattern::{PathPattern, PathPatternError};
pub use scheduler::{Scheduler, SchedulerSleeper, TokioSleeper};
pub use triggers::{ALL_CHANGES, DispatchReport, TriggerRouter};
