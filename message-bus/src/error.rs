//! Error types for message bus

use thiserror::Error;

/// Message bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stream could not be created or looked up
    #[error("Stream error: {0}")]
    Stream(String),

    /// Durable consumer could not be created
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// Publish error (broker rejected or never acknowledged the message)
    #[error("Publish error: {0}")]
    Publish(String),

    /// Subscribe error
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Publish acknowledgment did not arrive in time
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
