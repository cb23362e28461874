//! Completion API client.
//!
//! Non-streaming chat completions against OpenAI (or any server speaking the same API).

mod openai;

pub use openai::{ChatMessage, CompletionBackend, CompletionRequest, OpenAiClient, OpenAiError};
