//! Reply generation: build the property-manager prompt and ask the completion API for a reply.

use crate::channels::InboundMessage;
use crate::llm::{ChatMessage, CompletionBackend, CompletionRequest, OpenAiError};
use crate::properties::{BookingContext, Property};
use std::sync::Arc;

pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 150;

/// Returned when the API answers without text. A successful reply, not an error.
pub const FALLBACK_REPLY: &str =
    "I apologize, but I couldn't generate a response at the moment. Please try again.";

/// System instruction: property facts plus the guest's booking status.
pub fn system_prompt(property: &Property, booking: &BookingContext) -> String {
    let booking_text = if booking.has_booking {
        format!(
            "This guest has a confirmed booking:\n- Check-in date: {}\n- Check-out date: {}",
            booking.check_in.as_deref().unwrap_or("unknown"),
            booking.check_out.as_deref().unwrap_or("unknown"),
        )
    } else {
        "This guest has not made a booking yet.".to_string()
    };
    format!(
        "You are a helpful property manager assistant for {name}.\n\
         Here are the property details:\n\
         - Address: {address}\n\
         - Check-in time: {check_in}\n\
         - Check-out time: {check_out}\n\
         - Maximum guests: {max_guests}\n\
         \n\
         {booking_text}\n\
         \n\
         Provide concise, friendly responses to guest inquiries. Be professional and welcoming.",
        name = property.name,
        address = property.address,
        check_in = property.check_in_time,
        check_out = property.check_out_time,
        max_guests = property.max_guests,
    )
}

/// User instruction: the guest message, verbatim.
pub fn user_prompt(message: &InboundMessage) -> String {
    format!(
        "Guest message: \"{}\"\n\nProvide a helpful response as the property manager.",
        message.message
    )
}

/// Drafts replies through a completion backend with a fixed model.
#[derive(Clone)]
pub struct ReplyGenerator {
    backend: Arc<dyn CompletionBackend>,
    model: String,
}

impl ReplyGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    pub fn request(
        &self,
        message: &InboundMessage,
        property: &Property,
        booking: &BookingContext,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt(property, booking)),
                ChatMessage::user(user_prompt(message)),
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }

    /// One completion call. Empty or missing output yields [`FALLBACK_REPLY`]; transport and
    /// API failures are returned to the caller.
    pub async fn generate(
        &self,
        message: &InboundMessage,
        property: &Property,
        booking: &BookingContext,
    ) -> Result<String, OpenAiError> {
        let request = self.request(message, property, booking);
        let content = self.backend.complete(&request).await?;
        match content.filter(|c| !c.trim().is_empty()) {
            Some(reply) => Ok(reply),
            None => {
                log::info!("reply: completion returned no text, using fallback reply");
                Ok(FALLBACK_REPLY.to_string())
            }
        }
    }
}
