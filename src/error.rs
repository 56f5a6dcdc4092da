//! Error types for PulseVault

use std::fmt;

/// Result type alias for PulseVault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for PulseVault
#[derive(Debug)]
pub enum Error {
    /// Malformed identity or sample; the caller must fix the input
    Validation(String),
    /// Sample older than the lateness window; the sample is dropped and counted
    TooLate { timestamp: i64, horizon: i64 },
    /// Unsealed-chunk memory is over its bound; retryable after a delay
    Backpressure,
    /// Query cancelled by the caller
    Cancelled,
    /// Configuration errors
    Config(String),
    /// Object store errors
    ObjectStore(object_store::Error),
    /// IO errors
    Io(std::io::Error),
    /// Chunk encode/decode errors
    Codec(String),
    /// Serialization errors
    Serialization(String),
}

impl Error {
    /// Whether the caller may retry the operation unchanged after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Backpressure)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ObjectStore(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::TooLate { timestamp, horizon } => {
                write!(
                    f,
                    "Sample too late: timestamp {} is older than lateness horizon {}",
                    timestamp, horizon
                )
            }
            Error::Backpressure => write!(f, "Store over memory bound, retry after a delay"),
            Error::Cancelled => write!(f, "Query cancelled"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::ObjectStore(e) => write!(f, "Object store error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Codec(msg) => write!(f, "Chunk codec error: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Self {
        Error::ObjectStore(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
