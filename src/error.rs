//! Error types for the dispatch core

use thiserror::Error;

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while normalizing, routing or persisting messages
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport call failed (send, delete, edit, download)
    #[error("transport error: {0}")]
    Transport(String),

    /// A middleware aborted the chain
    #[error("middleware error: {0}")]
    Middleware(String),

    /// A command handler failed
    #[error("command error: {0}")]
    Command(String),

    /// Store load or flush failed
    #[error("store error: {0}")]
    Store(String),

    /// Outbound media loading failed
    #[error("media error: {0}")]
    Media(String),

    /// The exclusive queue dropped a task before it produced a result
    #[error("exclusive task was dropped before completion")]
    QueueClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
