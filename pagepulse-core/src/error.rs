//! Error types for pagepulse-core

use thiserror::Error;

/// Main error type for the pagepulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Durable storage error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A facade call was made before `init`
    #[error("tracker is not initialized; call init() first")]
    NotInitialized,

    /// `init` was called while a tracker is already active
    #[error("tracker is already initialized")]
    AlreadyInitialized,

    /// The tracker was cleaned up and no longer accepts calls
    #[error("tracker has been cleaned up")]
    Closed,

    /// Collector delivery error (transport failure or non-success status)
    #[error("delivery error: {0}")]
    Delivery(String),

    /// No async runtime available for timers and background sends
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for pagepulse-core
pub type Result<T> = std::result::Result<T, Error>;
