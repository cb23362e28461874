//! Relay pipeline: validate → resolve property → generate reply → dispatch.
//!
//! Stages run strictly in sequence, each one at most once. The first failure ends the
//! request; the gateway turns it into the error envelope. Requests share no mutable state.

use crate::channels::{InboundMessage, MakeWebhook, ReplyDispatcher, Validator};
use crate::config::Settings;
use crate::error::RelayError;
use crate::llm::{CompletionBackend, OpenAiClient};
use crate::properties::{resolver_for, AirtableClient, BookingContext, ContextResolver};
use crate::reply::ReplyGenerator;
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;

/// Pipeline stage, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    ResolvingContext,
    Generating,
    Dispatching,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Validating => "validating",
            Stage::ResolvingContext => "resolving context",
            Stage::Generating => "generating",
            Stage::Dispatching => "dispatching",
        })
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A reply was generated and accepted by the delivery webhook.
    Replied { property_id: String, reply: String },
    /// Autopilot is off; the message was validated and matched but not answered.
    Acknowledged { property_id: String },
}

pub struct Relay {
    validator: Validator,
    resolver: Arc<dyn ContextResolver>,
    generator: ReplyGenerator,
    dispatcher: Arc<dyn ReplyDispatcher>,
    autopilot: bool,
}

impl Relay {
    pub fn new(
        validator: Validator,
        resolver: Arc<dyn ContextResolver>,
        generator: ReplyGenerator,
        dispatcher: Arc<dyn ReplyDispatcher>,
        autopilot: bool,
    ) -> Self {
        Self {
            validator,
            resolver,
            generator,
            dispatcher,
            autopilot,
        }
    }

    /// Wire the production collaborators (Airtable, OpenAI, delivery webhook) from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = AirtableClient::new(&settings.airtable).context("building airtable client")?;
        let completion: Arc<dyn CompletionBackend> = Arc::new(
            OpenAiClient::new(
                &settings.openai.base_url,
                &settings.openai.api_key,
                settings.openai.timeout,
            )
            .context("building openai client")?,
        );
        let dispatcher = MakeWebhook::new(
            settings.delivery.webhook_url.clone(),
            settings.delivery.timeout,
        )
        .context("building delivery webhook client")?;
        Ok(Self::new(
            Validator::new(settings.relay.validation),
            resolver_for(settings, Arc::new(store)),
            ReplyGenerator::new(completion, settings.openai.model.clone()),
            Arc::new(dispatcher),
            settings.relay.autopilot,
        ))
    }

    /// Run the pipeline on a raw request body.
    pub async fn handle_body(&self, request_id: &str, body: &[u8]) -> Result<Outcome, RelayError> {
        log::debug!("relay[{}]: {}", request_id, Stage::Validating);
        let message = self
            .validator
            .parse_body(body)
            .map_err(|e| failed(request_id, Stage::Validating, e))?;
        self.handle(request_id, &message).await
    }

    /// Run the pipeline from an already validated message.
    pub async fn handle(
        &self,
        request_id: &str,
        message: &InboundMessage,
    ) -> Result<Outcome, RelayError> {
        log::info!(
            "relay[{}]: message from {} at {} ({} chars)",
            request_id,
            message.sender,
            message.timestamp,
            message.message.len()
        );

        log::debug!("relay[{}]: {}", request_id, Stage::ResolvingContext);
        let property = self
            .resolver
            .resolve(&message.sender)
            .await
            .map_err(|e| failed(request_id, Stage::ResolvingContext, e))?;
        log::debug!("relay[{}]: matched property {} ({})", request_id, property.id, property.name);

        if !self.autopilot {
            log::info!("relay[{}]: autopilot off, not replying", request_id);
            return Ok(Outcome::Acknowledged {
                property_id: property.id,
            });
        }

        log::debug!("relay[{}]: {}", request_id, Stage::Generating);
        let booking = BookingContext::default();
        let reply = self
            .generator
            .generate(message, &property, &booking)
            .await
            .map_err(|e| failed(request_id, Stage::Generating, e.into()))?;

        log::debug!("relay[{}]: {}", request_id, Stage::Dispatching);
        self.dispatcher
            .dispatch(&reply)
            .await
            .map_err(|e| failed(request_id, Stage::Dispatching, e.into()))?;

        log::info!("relay[{}]: reply sent for property {}", request_id, property.id);
        Ok(Outcome::Replied {
            property_id: property.id,
            reply,
        })
    }
}

fn failed(request_id: &str, stage: Stage, e: RelayError) -> RelayError {
    log::warn!("relay[{}]: {} failed ({}): {}", request_id, stage, e.kind(), e);
    e
}
