//! Error types for the printer library

use std::time::Duration;
use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Request payload is missing or blank
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Endpoint write reported an error
    #[error("Transmission to {endpoint} failed: {source}")]
    Transmission {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error outside of the transmission itself (staging, task join)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transmission did not finish before the deadline
    #[error("Timeout after {timeout:?} on {endpoint}")]
    Timeout { endpoint: String, timeout: Duration },

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl PrintError {
    /// Whether the job ended because its deadline passed
    pub fn is_timeout(&self) -> bool {
        matches!(self, PrintError::Timeout { .. })
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

/// Non-fatal conditions raised while compiling a job
///
/// These never abort a job; the compiler applies a deterministic fallback
/// and reports what it did.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrintWarning {
    /// QR data exceeded the configured maximum and was truncated
    #[error("QR payload too large: {original} chars, truncated to {max}")]
    PayloadTooLarge { original: usize, max: usize },

    /// QR image rasterization was not possible, native QR commands used instead
    #[error("Unsupported render: {0}")]
    UnsupportedRender(String),
}

/// A job that did not print, with the warnings raised while compiling it
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PrintFailure {
    #[source]
    pub error: PrintError,
    pub warnings: Vec<PrintWarning>,
}

impl PrintFailure {
    pub fn is_timeout(&self) -> bool {
        self.error.is_timeout()
    }
}

impl From<PrintError> for PrintFailure {
    fn from(error: PrintError) -> Self {
        Self {
            error,
            warnings: Vec::new(),
        }
    }
}
