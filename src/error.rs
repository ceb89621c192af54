//! Error types for trace loading and catalog construction
//!
//! Only structural problems are errors. Filters that match nothing produce
//! empty results, and per-invocation anomalies (an end without a start, a
//! message that never arrived) are data: they are logged and skipped or show
//! up as incomplete records.

use thiserror::Error;

/// Errors that can occur while loading a trace or building its catalog
#[derive(Error, Debug)]
pub enum TraceError {
    /// Two definition events claim the same handle with conflicting metadata
    #[error("handle {handle:#x} is defined twice with conflicting metadata ({first} vs {second})")]
    AmbiguousIdentity {
        handle: u64,
        first: String,
        second: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode event {index}: {message}")]
    Decode { index: usize, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid filter expression: {0}")]
    InvalidFilter(String),
}

/// Result type for library operations
pub type Result<T> = std::result::Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_identity_message_names_handle() {
        let err = TraceError::AmbiguousIdentity {
            handle: 0xdead,
            first: "node /a".to_string(),
            second: "node /b".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0xdead"));
        assert!(msg.contains("node /a"));
        assert!(msg.contains("node /b"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TraceError = io.into();
        assert!(matches!(err, TraceError::Io(_)));
    }
}
