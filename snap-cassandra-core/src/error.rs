//! Error types for metric publishing

use thiserror::Error;

/// Result type for publish operations
pub type PublishResult<T> = Result<T, PublishError>;

/// Error taxonomy for the publish path
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown content type '{0}'")]
    UnknownContentType(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid data type value found - {0}")]
    InvalidDataType(String),

    #[error("Cassandra error: {0}")]
    Store(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Publisher is closed")]
    Closed,

    /// Per-record failures collected over a whole batch
    #[error("{}", .0.join(";"))]
    Batch(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PublishError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode(message.into())
    }

    /// Create a new store write error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store(message.into())
    }

    /// Create a new session establishment error
    pub fn session<S: Into<String>>(message: S) -> Self {
        Self::Session(message.into())
    }

    /// Session establishment failures leave the publisher without a store; the
    /// host is expected to terminate when it sees one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PublishError::Session(_))
    }

    /// Whether the error only affected a single record of a batch
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            PublishError::InvalidDataType(_) | PublishError::Store(_)
        )
    }

    /// Get the error category for monitoring/metrics
    pub fn category(&self) -> &'static str {
        match self {
            PublishError::Configuration(_) => "configuration",
            PublishError::UnknownContentType(_) => "content_type",
            PublishError::Decode(_) => "decode",
            PublishError::InvalidDataType(_) => "invalid_data_type",
            PublishError::Store(_) => "store",
            PublishError::Session(_) => "session",
            PublishError::Closed => "closed",
            PublishError::Batch(_) => "batch",
            PublishError::Io(_) => "io",
            PublishError::Json(_) => "json",
        }
    }
}
