//! Error types for option storage, loading and parsing.

use thiserror::Error;

/// Errors that can occur while loading, persisting or parsing options.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// No option is registered under this name.
    #[error("unknown option: {0}")]
    UnknownOption(String),

    /// Manifest could not be read or decoded.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// User input was rejected by the option type's codec.
    #[error("invalid input for {name}: {reason}")]
    InvalidInput { name: String, reason: String },

    /// Shortcut string could not be parsed.
    #[error("invalid shortcut: {0}")]
    InvalidShortcut(String),

    /// Cannot connect to or communicate with the storage backend.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Backend quota exhausted.
    #[error("storage full: {0}")]
    StorageFull(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Database error from SQLx.
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP error while fetching a manifest or translation file.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for option operations.
pub type Result<T> = std::result::Result<T, OptionsError>;

impl OptionsError {
    pub(crate) fn invalid_input(name: &str, reason: impl Into<String>) -> Self {
        OptionsError::InvalidInput {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for OptionsError {
    fn from(err: serde_json::Error) -> Self {
        OptionsError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for OptionsError {
    fn from(err: toml::de::Error) -> Self {
        OptionsError::Config(err.to_string())
    }
}
