//! Unified error type for the Korona bot.

use thiserror::Error;

/// Result type alias using KoronaError.
pub type Result<T> = std::result::Result<T, KoronaError>;

#[derive(Error, Debug)]
pub enum KoronaError {
    // Schedule errors
    #[error("Invalid time expression: {0}")]
    Parse(String),

    #[error("No matching time for expression: {0}")]
    NoMatch(String),

    #[error("Trigger already running")]
    AlreadyRunning,

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Collaborator errors
    #[error("User store error: {0}")]
    Store(String),

    #[error("Metric fetch failed: {0}")]
    Fetch(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KoronaError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }
}
