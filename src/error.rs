//! Error types for gati-odom

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// gati-odom error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be written back out
    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    /// Configuration value rejected at startup
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Encoder event that cannot produce a velocity
    #[error("Malformed encoder event: {0}")]
    MalformedEvent(String),

    /// Wire encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
