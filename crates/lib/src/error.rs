//! Relay error taxonomy and its mapping onto HTTP status codes.

use crate::channels::DispatchError;
use crate::llm::OpenAiError;
use crate::properties::AirtableError;

/// Message returned to the caller when no property can be resolved.
pub const NOT_FOUND_MESSAGE: &str = "No property found for this sender";

/// Any failure of one inbound request. The gateway is the single place that turns these into
/// responses; every stage returns immediately on its own failure and nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A required field is missing, empty, or has the wrong type.
    #[error("{0}")]
    Validation(String),
    /// The request body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    MalformedRequest(String),
    /// The context store returned no record for this sender.
    #[error("{}", NOT_FOUND_MESSAGE)]
    NotFound,
    /// The context store could not be read.
    #[error("property lookup failed: {0}")]
    ContextStore(#[from] AirtableError),
    /// The completion API was unreachable or returned an error.
    #[error("reply generation failed: {0}")]
    Generation(#[from] OpenAiError),
    /// The delivery webhook was unreachable or answered non-2xx.
    #[error("reply delivery failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl RelayError {
    /// HTTP status for the error envelope: 404 for an unresolvable property, 500 otherwise.
    /// Delivery failures after a successful generation are deliberately not distinguished.
    pub fn status(&self) -> u16 {
        match self {
            RelayError::NotFound => 404,
            _ => 500,
        }
    }

    /// Short stable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation",
            RelayError::MalformedRequest(_) => "malformed_request",
            RelayError::NotFound => "not_found",
            RelayError::ContextStore(_) => "context_store",
            RelayError::Generation(_) => "generation",
            RelayError::Dispatch(_) => "dispatch",
        }
    }
}
