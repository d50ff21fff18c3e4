//! Push gateway adapters.
//!
//! - **http**: posts messages to a topic-messaging HTTP endpoint
//! - **log_only**: records messages in the trace log, for local runs

mod http;
mod log_only;

pub use http::{HttpPushGateway, HttpPushIdentity};
pub use log_only::LogOnlyPushGateway;

/// Whether `topic` only uses characters accepted by topic messaging.
pub(crate) fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%'))
}
