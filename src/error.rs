//! Error types for the Sketchguard service.

use thiserror::Error;

/// Main error type for Sketchguard operations.
#[derive(Error, Debug)]
pub enum SketchguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for SketchguardError {
    fn from(err: ::config::ConfigError) -> Self {
        SketchguardError::Config(err.to_string())
    }
}

/// Result type alias for Sketchguard operations.
pub type Result<T> = std::result::Result<T, SketchguardError>;
