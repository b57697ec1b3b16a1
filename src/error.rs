//! Error types for the predictive cache engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the predictive cache engine
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object ID outside the tracked range
    #[error("Object ID {id} is outside the tracked range (max {max})")]
    ObjectIdOutOfRange { id: u64, max: u64 },

    /// Interner cannot hand out another dense ID
    #[error("Object ID space exhausted: {capacity} distinct objects already interned")]
    IdSpaceExhausted { capacity: u64 },

    /// Work queue consumer has gone away
    #[error("Work queue '{0}' is closed")]
    QueueClosed(String),

    /// Advice receiver failed
    #[error("Cache advisor error: {0}")]
    Advisor(String),

    /// Malformed workload input
    #[error("Workload parse error at line {line}: {message}")]
    Workload { line: usize, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration error
    #[error("YAML configuration error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Prometheus registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the operation may succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QueueClosed(_) | Error::Advisor(_))
    }

    /// Whether the caller broke the dense ID contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::ObjectIdOutOfRange { .. } | Error::IdSpaceExhausted { .. }
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
