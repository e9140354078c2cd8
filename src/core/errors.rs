use crate::core::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Connect error: {0}")]
    ConnectError(String),

    #[error("Send error: {0}")]
    SendError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Subscription to {topic} rejected: {message}")]
    SubscriptionRejected { topic: String, message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("Session is closed")]
    SessionClosed,
}

impl ExchangeError {
    /// A single bad frame; the connection stays up.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::DecodeError(_))
    }

    /// Errors that are surfaced immediately and never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationError(_) | Self::AuthError(_) | Self::SessionClosed
        )
    }
}
