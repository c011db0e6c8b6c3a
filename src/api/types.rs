//! API request and response types

use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Bare base64 or a `data:<mime>;base64,<data>` URI
    #[serde(default)]
    pub image: Option<String>,
}

/// Reply to a chat message. Failures are reported here too.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// Build information
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub model: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
