use thiserror::Error;

/// Core error types for tiercache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote store unavailable during {operation}: {reason}")]
    RemoteUnavailable { operation: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalidation handler '{handler}' failed: {reason}")]
    HandlerFailure { handler: String, reason: String },
}

impl CacheError {
    /// Create a new Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new RemoteUnavailable error.
    pub fn remote_unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new HandlerFailure error.
    pub fn handler_failure(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HandlerFailure {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is absorbed by the cache layer itself.
    ///
    /// Recoverable errors (remote outage, failing handler) are logged and
    /// handled via fallback paths; they never surface to callers of the
    /// cache operations. Configuration and serialization errors do.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable { .. } | Self::HandlerFailure { .. }
        )
    }

    /// Get error category for logging/monitoring.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::RemoteUnavailable { .. } => ErrorCategory::Remote,
            Self::Serialization(_) | Self::JsonError(_) => ErrorCategory::Serialization,
            Self::HandlerFailure { .. } => ErrorCategory::Handler,
        }
    }
}

/// Error categories for monitoring and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Remote,
    Serialization,
    Handler,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Remote => write!(f, "remote"),
            Self::Serialization => write!(f, "serialization"),
            Self::Handler => write!(f, "handler"),
        }
    }
}

/// Convenience result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CacheError::configuration("backend 'tape-drive' is not supported");
        assert_eq!(
            err.to_string(),
            "Configuration error: backend 'tape-drive' is not supported"
        );
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_remote_unavailable_error() {
        let err = CacheError::remote_unavailable("get", "connection refused");
        assert_eq!(
            err.to_string(),
            "Remote store unavailable during get: connection refused"
        );
        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Remote);
    }

    #[test]
    fn test_handler_failure_error() {
        let err = CacheError::handler_failure("user-cascade", "lookup failed");
        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Handler);
        assert!(err.to_string().contains("user-cascade"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{ not json }").unwrap_err();
        let err: CacheError = json_err.into();

        assert!(matches!(err, CacheError::JsonError(_)));
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Serialization);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
        assert_eq!(ErrorCategory::Remote.to_string(), "remote");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
        assert_eq!(ErrorCategory::Handler.to_string(), "handler");
    }

    #[test]
    fn test_result_type_usage() {
        fn ok() -> Result<&'static str> {
            Ok("fine")
        }

        fn err() -> Result<&'static str> {
            Err(CacheError::serialization("corrupt payload"))
        }

        assert!(ok().is_ok());
        assert!(err().is_err());
    }
}
