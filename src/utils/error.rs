//! Error handling for the signal engine.

use thiserror::Error;

/// Main error type for the signal engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Data-related errors (e.g. missing or malformed market data)
    #[error("Data error: {0}")]
    DataError(String),

    /// A single market-data provider failed (non-2xx, bad payload, missing key)
    #[error("Provider {provider} error: {message}")]
    ProviderError { provider: String, message: String },

    /// A bounded call ran past its deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Persistence errors
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Connection / network errors
    #[error("Connection error: {0}")]
    ConnectionError(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Invalid argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a provider failure.
    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        Error::ProviderError { provider: provider.to_string(), message: message.into() }
    }
}

/// Result type for the signal engine
pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StorageError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("background task failed: {err}"))
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
