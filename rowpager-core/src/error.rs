//! Error types for rowpager-core

use std::fmt;
use thiserror::Error;

/// Store error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// I/O failure talking to the store
    Io,
    /// The store did not answer in time
    Timeout,
    /// The query itself failed (bad predicate, constraint, ...)
    Query,
    /// The caller cancelled the read
    Cancelled,
    /// The store is closed or otherwise unavailable
    Unavailable,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Io => "io",
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::Query => "query",
            StoreErrorKind::Cancelled => "cancelled",
            StoreErrorKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure reported by a [`QuerySource`](crate::source::QuerySource)
///
/// Store errors are surfaced to whoever asked for the load. They are never
/// retried by the pager and never treated as evidence of a mutation.
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StoreError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Io, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Timeout, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Query, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Cancelled, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::io(format!("I/O error: {}", err)).with_source(err)
    }
}

/// Result type alias for store reads
pub type Result<T> = std::result::Result<T, StoreError>;

/// A window came back with a different length than the count promised.
///
/// This never reaches callers as an error: the pager logs it, counts it and
/// turns it into [`InitialLoad::Invalidated`](crate::pager::InitialLoad).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("window at offset {offset} returned {actual} rows, expected {expected}")]
pub struct ConsistencyViolation {
    pub offset: usize,
    pub expected: usize,
    pub actual: usize,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = StoreError::timeout("count took too long");
        let msg = format!("{}", err);
        assert!(msg.contains("timeout"));
        assert!(msg.contains("count took too long"));
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: StoreError = io.into();

        assert_eq!(err.kind, StoreErrorKind::Io);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_consistency_violation_display() {
        let violation = ConsistencyViolation {
            offset: 4,
            expected: 5,
            actual: 3,
        };
        assert_eq!(
            violation.to_string(),
            "window at offset 4 returned 3 rows, expected 5"
        );
    }
}
