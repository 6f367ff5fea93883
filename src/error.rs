//! Error types for the Calibre-Web client.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use thiserror::Error;

/// Main error type for session, extraction and upload operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Reading local content failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A page is missing structure the extractor depends on
    #[error("Malformed page ({context}): {message}")]
    MalformedPage { context: String, message: String },

    /// Login was answered with a failure banner
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A write was answered with a failure banner
    #[error("Server rejected request: {0}")]
    Rejected(String),

    /// The server answered with a status the operation does not accept
    #[error("Unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Book, format or cover does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cover content is not png, jpeg or webp
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Format label or extension outside the known set
    #[error("Unknown book format: {0}")]
    UnknownFormat(String),

    /// A JSON endpoint returned something unexpected
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Server URL parsing or validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub(crate) fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError::MalformedPage {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}
