//! Driven port for the topic-based push-messaging gateway.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use super::define_port_error;

/// Visible part of a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushContent {
    pub title: String,
    pub body: String,
}

/// Message broadcast to every subscriber of `topic`.
///
/// Serialises to the gateway's wire shape:
///
/// ```
/// use std::collections::BTreeMap;
///
/// use reactors::domain::ports::{PushContent, PushMessage};
/// use serde_json::json;
///
/// let message = PushMessage {
///     topic: "user_u1".to_owned(),
///     notification: PushContent { title: "t".to_owned(), body: "b".to_owned() },
///     data: BTreeMap::from([("type".to_owned(), "task".to_owned())]),
/// };
/// assert_eq!(
///     serde_json::to_value(&message).expect("serialise"),
///     json!({
///         "topic": "user_u1",
///         "notification": { "title": "t", "body": "b" },
///         "data": { "type": "task" }
///     })
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub topic: String,
    pub notification: PushContent,
    pub data: BTreeMap<String, String>,
}

define_port_error! {
    /// Errors surfaced while delivering a push message.
    pub enum PushGatewayError {
        /// Network transport failed or the gateway answered with a server error.
        Transport { message: String } =>
            "push transport failed: {message}",
        /// Gateway refused the message.
        Rejected { status: u16, message: String } =>
            "push gateway rejected message ({status}): {message}",
        /// Topic name is not deliverable.
        InvalidTopic { topic: String } =>
            "push topic `{topic}` is invalid",
    }
}

/// Port for delivering push messages to topic subscribers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Deliver one message; returns once the gateway accepted it.
    async fn send(&self, message: &PushMessage) -> Result<(), PushGatewayError>;
}
