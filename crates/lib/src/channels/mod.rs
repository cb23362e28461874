//! Messaging channel edges.
//!
//! Inbound messages arrive as webhook bodies and are validated into [`InboundMessage`];
//! replies leave through a [`ReplyDispatcher`] (the delivery webhook).

mod inbound;
mod make;

pub use inbound::{InboundMessage, Validator};
pub use make::{DispatchError, MakeWebhook, OutboundPayload, ReplyDispatcher};
