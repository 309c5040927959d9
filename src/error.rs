//! Error types for the rover control core

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Rover control core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document could not be parsed or did not match the schema
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Manager started before a configuration was loaded
    #[error("No configuration loaded")]
    NotConfigured,

    /// Message channel shut down cleanly
    #[error("Channel closed")]
    ChannelClosed,

    /// Remote message arrived on a topic nobody handles
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Worker thread could not be spawned
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
}
