//! Webhook response envelopes.

use serde::{Deserialize, Serialize};

pub const SUCCESS_MESSAGE: &str = "Message processed successfully";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";
pub const FORBIDDEN_MESSAGE: &str = "Forbidden";

/// Body of every webhook answer except 405: `{ "success", "message" }` or `{ "success", "error" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: Some(SUCCESS_MESSAGE.to_string()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// 405 body: `{ "error": "Method not allowed" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodNotAllowed {
    pub error: String,
}

impl Default for MethodNotAllowed {
    fn default() -> Self {
        Self {
            error: METHOD_NOT_ALLOWED_MESSAGE.to_string(),
        }
    }
}
