//! Delivery webhook: POST the generated reply as `{ "Body": ... }` to the automation
//! platform, which relays it back into the messaging channel.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Wire shape expected by the delivery webhook.
#[derive(Debug, Serialize)]
pub struct OutboundPayload<'a> {
    #[serde(rename = "Body")]
    pub body: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("delivery webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("delivery webhook answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sends one reply. Single attempt: no retry, no idempotency key.
#[async_trait]
pub trait ReplyDispatcher: Send + Sync {
    async fn dispatch(&self, reply: &str) -> Result<(), DispatchError>;
}

/// Delivery through a fixed webhook URL (e.g. a Make.com custom webhook).
#[derive(Clone)]
pub struct MakeWebhook {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl MakeWebhook {
    pub fn new(url: reqwest::Url, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl ReplyDispatcher for MakeWebhook {
    async fn dispatch(&self, reply: &str) -> Result<(), DispatchError> {
        let res = self
            .client
            .post(self.url.clone())
            .json(&OutboundPayload { body: reply })
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(DispatchError::Status { status, body });
        }
        log::debug!("delivery webhook accepted reply ({} chars)", reply.len());
        Ok(())
    }
}
