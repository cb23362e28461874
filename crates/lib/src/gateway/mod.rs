//! Gateway: inbound HTTP surface.
//!
//! Single port serves a health probe and the webhook the automation platform calls for every
//! guest message. Every request is handled independently by the relay pipeline.

mod protocol;
mod server;

pub use protocol::{MethodNotAllowed, WebhookResponse, SUCCESS_MESSAGE};
pub use server::{router, run_gateway, run_gateway_with, GatewayState, SECRET_HEADER};
