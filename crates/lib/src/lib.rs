//! Concierge core library: guest message relay shared by the CLI.
//!
//! An inbound webhook carries a guest message; the relay picks the property it concerns,
//! drafts a reply with a language model and posts it to the delivery webhook.

pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod properties;
pub mod relay;
pub mod reply;
