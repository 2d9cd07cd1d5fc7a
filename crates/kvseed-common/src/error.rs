//! Error types for kvseed

use thiserror::Error;

/// Result type alias for kvseed operations
pub type Result<T> = std::result::Result<T, KvseedError>;

/// Main error type for kvseed
///
/// Only run-level failures are represented here. Per-item failures (a rejected
/// write, a missing key) are recorded in the run summary instead of being
/// raised.
#[derive(Error, Debug)]
pub enum KvseedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing credentials, missing backend tool, invalid numeric settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input root or partition could not be read
    #[error("Input error: {0}")]
    Input(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

impl KvseedError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an input error
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = KvseedError::config("CF_API_TOKEN must be set");
        assert_eq!(err.to_string(), "Configuration error: CF_API_TOKEN must be set");
        assert!(matches!(err, KvseedError::Config(_)));
    }

    #[test]
    fn test_io_error_is_not_config() {
        let err: KvseedError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, KvseedError::Io(_)));
        assert!(err.to_string().starts_with("IO error"));
    }
}
