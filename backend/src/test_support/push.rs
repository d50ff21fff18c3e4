//! Push gateway double recording every delivery attempt.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::ports::{PushGateway, PushGatewayError, PushMessage};

#[derive(Default)]
struct Recorded {
    failing_topics: BTreeSet<String>,
    sent: Vec<PushMessage>,
    attempts: usize,
}

/// Gateway that accepts every message except those sent to failing topics.
#[derive(Default)]
pub struct RecordingPushGateway(Mutex<Recorded>);

impl RecordingPushGateway {
    /// Make every send to `topic` fail with a transport error.
    pub fn fail_topic(&self, topic: &str) {
        self.lock().failing_topics.insert(topic.to_owned());
    }

    /// Messages the gateway accepted, in delivery order.
    pub fn sent(&self) -> Vec<PushMessage> {
        self.lock().sent.clone()
    }

    /// Every send call, successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("push gateway mutex"),
        }
    }
}

#[async_trait]
impl PushGateway for RecordingPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<(), PushGatewayError> {
        let mut recorded = self.lock();
        recorded.attempts += 1;
        if recorded.failing_topics.contains(&message.topic) {
            return Err(PushGatewayError::transport(format!(
                "topic {} unreachable",
                message.topic
            )));
        }
        recorded.sent.push(message.clone());
        Ok(())
    }
}
