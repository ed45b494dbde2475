//! # Error Handling Module
//!
//! This module defines every failure a logical request can end in, using the
//! `thiserror` crate for the `Display`/`Error` boilerplate.
//!
//! ## Error Taxonomy
//! - `Transport`: no response was received at all
//! - `Timeout`: the transport call exceeded its deadline
//! - `Http`: a response arrived with a non-2xx status
//! - `UnsupportedMethod`: an unrecognized verb (programmer error)
//!
//! The remaining variants cover the orchestration layer itself (cancellation,
//! body (de)serialization, configuration and internal failures).
//!
//! Errors are `Clone`: deduplicated waiters each receive a copy of the shared
//! outcome, so underlying sources are flattened into messages.

use thiserror::Error;

/// Main result type used throughout the client
pub type ClientResult<T> = Result<T, ClientError>;

/// Every terminal failure of a logical request
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    /// No response received (connection refused, reset, DNS failure, ...)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The transport call exceeded its deadline and was cancelled
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A response was received with a non-2xx status
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// The requested verb is not one the client knows how to send
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },

    /// The logical request was cancelled by its caller or by `Client::close`
    #[error("Request cancelled")]
    Cancelled,

    /// Request body encoding or response body decoding failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Invalid client configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unexpected internal failure (e.g. a panicking interceptor)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create a transport error with a custom message
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http<S: Into<String>>(status: u16, body: S) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Default retry predicate
    ///
    /// Failures without an HTTP status (network and timeout) and 5xx
    /// responses are transient. Everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get a string representation of the error type for logs and metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport_error",
            Self::Timeout { .. } => "timeout",
            Self::Http { .. } => "http_error",
            Self::UnsupportedMethod { .. } => "unsupported_method",
            Self::Cancelled => "cancelled",
            Self::Serialization { .. } => "serialization_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ClientError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: format!("YAML error: {}", err),
        }
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration {
            message: format!("TOML error: {}", err),
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}

/// Any reqwest failure means no usable response
///
/// The per-request deadline is enforced by the executor, so a timeout raised
/// by the underlying reqwest client is reported as a transport failure.
impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("transport timed out: {}", err)
        } else {
            err.to_string()
        };
        Self::Transport { message }
    }
}
