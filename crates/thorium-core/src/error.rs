//! Error types for Thorium core library.

use thiserror::Error;

/// Result type alias using Thorium Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Thorium operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Character snapshot could not be encoded or decoded
    #[error("Invalid character snapshot: {0}")]
    Snapshot(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
