use thiserror::Error;

use crate::transport::TransportError;

/// Systemic client failures.
///
/// `Clone` so a single failed token refresh can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("channel resolution failed: {0}")]
    ChannelResolution(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("provider rejected request ({status}): {message}")]
    Request { status: u16, message: String },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

impl Error {
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    #[must_use]
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }

    /// Whether the failure happened before the provider answered.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<wabridge_config::ConfigError> for Error {
    fn from(e: wabridge_config::ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
