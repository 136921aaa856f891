//! Error types for the stream player

use thiserror::Error;

/// Main error type for the player
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio output errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Sink is not open")]
    SinkClosed,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Address resolution failed: {0}")]
    Resolve(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Interface enumeration failed: {0}")]
    Interfaces(String),

    #[error("Packet pool exhausted")]
    PoolExhausted,

    #[error("Interrupted")]
    Interrupted,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid host: {0:?}")]
    InvalidHost(String),

    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("Invalid bit depth: {0}")]
    InvalidBitDepth(u16),

    #[error("Invalid channel count: {0}")]
    InvalidChannels(u16),

    #[error("Invalid retry tiers: {0}")]
    InvalidRetryTiers(String),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No config directory available")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the player
pub type Result<T> = std::result::Result<T, Error>;
