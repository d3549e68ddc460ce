//! Error types for cache operations
//!
//! Steady-state cache operations never surface these to callers; they are
//! logged and converted into misses or no-ops at the public boundary. They do
//! reach callers from configuration loading and from `warmup_all`.

use thiserror::Error;

/// Main error type for the cache subsystem
#[derive(Error, Debug)]
pub enum CacheError {
    /// Value could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shared (distributed) layer is unreachable or rejected the call
    #[error("Distributed store error: {0}")]
    Distributed(String),

    /// A data-source collaborator failed
    #[error("Collaborator '{source_name}' failed: {message}")]
    Collaborator {
        source_name: String,
        message: String,
    },

    /// Warmup orchestration could not be set up
    #[error("Warmup error: {0}")]
    Warmup(String),

    /// A warmup run is already in progress
    #[error("Warmup already in progress")]
    WarmupInProgress,

    /// Unknown warmup category name
    #[error("Unknown warmup category: {0}")]
    UnknownCategory(String),

    /// Operation timeout
    #[error("Operation timed out after {seconds}s: {context}")]
    Timeout { seconds: u64, context: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Build a collaborator failure for the named source
    pub fn collaborator(source_name: impl Into<String>, message: impl ToString) -> Self {
        CacheError::Collaborator {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::Distributed("connection refused".to_string());
        assert_eq!(error.to_string(), "Distributed store error: connection refused");

        let timeout_error = CacheError::Timeout {
            seconds: 30,
            context: "warmup inventory".to_string(),
        };
        assert!(timeout_error.to_string().contains("timed out after 30s"));

        let collaborator = CacheError::collaborator("inventory", "db down");
        assert!(collaborator.to_string().contains("'inventory'"));
        assert!(collaborator.to_string().contains("db down"));
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "test error".into();
        assert!(matches!(error, CacheError::Other(_)));

        let error: CacheError = "test error".to_string().into();
        assert!(matches!(error, CacheError::Other(_)));

        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let error: CacheError = json_err.into();
        assert!(matches!(error, CacheError::Serialization(_)));
    }
}
