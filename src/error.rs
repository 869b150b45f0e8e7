//! Sanad error types

use std::time::Duration;

/// How the backoff loop treats a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Likely to succeed on another attempt (rate limit, temporary outage).
    Transient,
    /// Retrying would reproduce the failure.
    Fatal,
}

/// Sanad error types
#[derive(Debug, thiserror::Error)]
pub enum SanadError {
    // Upstream/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Model output could not be reduced to structured data, even after
    /// the single repair pass. `span` holds the text that failed to parse.
    #[error("unparseable model output: {message}")]
    Parse { message: String, span: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Soft errors
    #[error("empty response from model")]
    EmptyResponse,

    #[error("content filtered: {reason}")]
    ContentFiltered { reason: String },

    /// Cache store failure. Stores return it; the gateway never surfaces it.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl SanadError {
    /// Build a parse error carrying the offending text.
    pub fn parse(message: impl Into<String>, span: impl Into<String>) -> Self {
        SanadError::Parse {
            message: message.into(),
            span: span.into(),
        }
    }

    /// Classify this error for the backoff loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            SanadError::RateLimited { .. } | SanadError::Http(_) | SanadError::EmptyResponse => {
                ErrorClass::Transient
            }
            SanadError::Api { status, .. } if matches!(status, 500 | 502 | 503 | 504) => {
                ErrorClass::Transient
            }
            _ => ErrorClass::Fatal,
        }
    }

    /// Whether another attempt (possibly with another credential) may succeed.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SanadError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            e if e.is_transient() => "The service is busy, please try again shortly.",
            SanadError::Parse { .. } => "The answer could not be read. Please try again.",
            SanadError::ContentFiltered { .. } => "This request cannot be answered.",
            SanadError::Cancelled => "The request was cancelled.",
            _ => "Something went wrong. Please try again later.",
        }
    }
}

impl From<reqwest::Error> for SanadError {
    fn from(err: reqwest::Error) -> Self {
        SanadError::Http(err.to_string())
    }
}

/// Result type alias for Sanad operations
pub type Result<T> = std::result::Result<T, SanadError>;
