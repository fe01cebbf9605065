// Error taxonomy for the dispatch pipeline

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// No model resolvable for a service type, or a referenced secret is missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx relay status (other than 429) or a network failure.
    #[error("transport error (status {status:?}): {message}")]
    Transport { status: Option<u16>, message: String },

    #[error("quota exceeded (status {status})")]
    Quota { status: u16 },

    /// Response body did not match any known provider schema.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("empty response")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Stable short code, useful for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CFG-1001",
            Self::Transport { .. } => "NET-1001",
            Self::Quota { .. } => "NET-1429",
            Self::Parse(_) => "PRS-1001",
            Self::EmptyResponse => "PRS-1002",
            Self::InvalidRequest(_) => "REQ-1001",
        }
    }

    /// Text shown to the end user. Never carries raw provider payloads.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(detail) => format!("AI is not configured: {}", detail),
            Self::Transport {
                status: Some(status),
                ..
            } => format!("Error contacting the AI service (HTTP {})", status),
            Self::Transport { status: None, .. } => {
                "Error contacting the AI service: relay unreachable".to_string()
            }
            Self::Quota { .. } => {
                "Too many requests to the AI service. Please wait a couple of minutes or switch model."
                    .to_string()
            }
            Self::Parse(_) => "Could not parse response".to_string(),
            Self::EmptyResponse => "empty response".to_string(),
            Self::InvalidRequest(detail) => format!("Invalid request: {}", detail),
        }
    }
}
