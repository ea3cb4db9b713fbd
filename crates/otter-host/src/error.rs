//! Error types for otter-host
//!
//! Every failure that crosses the host boundary is one of these values. A
//! [`HostError::Thrown`] is what script code observes as an exception.

use thiserror::Error;

/// Errors surfaced to the scripting runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Exception raised by an op, `name` is the error kind seen by script code
    #[error("{name}: {message}")]
    Thrown { name: String, message: String },

    /// No op registered under this name
    #[error("Unknown op: {0}")]
    UnknownOp(String),

    /// The context was torn down, no further calls are accepted
    #[error("Host context has been destroyed")]
    ContextDestroyed,

    /// Host-side failure unrelated to the op's arguments
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostError {
    /// Create an exception with the given kind and message
    pub fn thrown(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Thrown {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Error kind as script code sees it
    pub fn name(&self) -> &str {
        match self {
            Self::Thrown { name, .. } => name,
            Self::UnknownOp(_) => "TypeError",
            Self::ContextDestroyed => "ContextDestroyed",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Human-readable message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            Self::Thrown { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for HostError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Result type alias for host operations
pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrown_display() {
        let err = HostError::thrown("InvalidHandle", "get: invalid store handle 7");
        assert_eq!(err.name(), "InvalidHandle");
        assert_eq!(err.message(), "get: invalid store handle 7");
        assert_eq!(err.to_string(), "InvalidHandle: get: invalid store handle 7");
    }

    #[test]
    fn test_non_thrown_names() {
        assert_eq!(HostError::UnknownOp("nope".into()).name(), "TypeError");
        assert_eq!(HostError::ContextDestroyed.name(), "ContextDestroyed");
        assert_eq!(
            HostError::internal("boom").message(),
            "Internal error: boom"
        );
    }
}
