//! Reqwest-backed push gateway adapter.
//!
//! This adapter owns transport details only: the request envelope, bearer
//! authentication, timeout and HTTP error mapping.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use super::is_valid_topic;
use crate::domain::ports::{PushGateway, PushGatewayError, PushMessage};

const DEFAULT_USER_AGENT: &str = "tradetrackr-reactors/0.1";

/// Outbound identity attached to every push request.
#[derive(Debug, Clone, Default)]
pub struct HttpPushIdentity {
    /// Bearer token sent in the `Authorization` header, when configured.
    pub bearer_token: Option<String>,
    /// HTTP user-agent; defaults to the crate identity.
    pub user_agent: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    message: &'a PushMessage,
}

/// Push gateway posting `{"message": ...}` envelopes to one endpoint.
pub struct HttpPushGateway {
    client: Client,
    endpoint: Url,
    bearer_token: Option<String>,
    user_agent: String,
}

impl HttpPushGateway {
    /// Build an adapter using a reqwest client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration, identity: HttpPushIdentity) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            bearer_token: identity.bearer_token.filter(|token| !token.trim().is_empty()),
            user_agent: identity
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<(), PushGatewayError> {
        if !is_valid_topic(&message.topic) {
            return Err(PushGatewayError::invalid_topic(message.topic.as_str()));
        }
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::USER_AGENT, self.user_agent.as_str())
            .json(&Envelope { message });
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.map_err(map_transport_error)?;
        Err(map_status_error(status, body.as_ref()))
    }
}

fn map_transport_error(error: reqwest::Error) -> PushGatewayError {
    if error.is_timeout() {
        PushGatewayError::transport(format!("request timed out: {error}"))
    } else {
        PushGatewayError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> PushGatewayError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => PushGatewayError::transport(message),
        _ if status.is_client_error() => PushGatewayError::rejected(status.as_u16(), message),
        _ => PushGatewayError::transport(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
