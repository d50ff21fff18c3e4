//! Gateway that only logs messages.

use async_trait::async_trait;
use tracing::info;

use super::is_valid_topic;
use crate::domain::ports::{PushGateway, PushGatewayError, PushMessage};

/// Accepts every well-formed message and logs it instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyPushGateway;

#[async_trait]
impl PushGateway for LogOnlyPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<(), PushGatewayError> {
        if !is_valid_topic(&message.topic) {
            return Err(PushGatewayError::invalid_topic(message.topic.as_str()));
        }
        info!(
            topic = %message.topic,
            title = %message.notification.title,
            kind = message.data.get("type").map(String::as_str),
            "push message logged instead of delivered"
        );
        Ok(())
    }
}
