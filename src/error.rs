//! Tagged error taxonomy shared by every collaborator and command.
//!
//! Errors are `Clone` so a single failure can be stored in a state snapshot
//! and handed to every caller waiting on the same operation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Underlying cause attached to a [`CoreError`], shared so the error stays `Clone`.
pub type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// The kind of a failure, independent of where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Auth,
    Storage,
    Validation,
    Unknown,
}

impl ErrorKind {
    /// Whether a retry policy may attempt the operation again.
    /// Validation failures will not fix themselves.
    pub fn is_retryable(self) -> bool {
        self != Self::Validation
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Storage => "storage",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
    #[error("authentication error: {message}")]
    Auth {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
    #[error("invalid input: {message}")]
    Validation {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
    #[error("{message}")]
    Unknown {
        message: String,
        #[source]
        cause: Option<Cause>,
    },
}

impl CoreError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            cause: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            cause: None,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            cause: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            cause: None,
        }
    }

    /// Attach an underlying cause, replacing any previous one.
    pub fn with_cause<E>(mut self, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let shared: Cause = Arc::new(err);
        match &mut self {
            Self::Network { cause, .. }
            | Self::Auth { cause, .. }
            | Self::Storage { cause, .. }
            | Self::Validation { cause, .. }
            | Self::Unknown { cause, .. } => *cause = Some(shared),
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Network { message, .. }
            | Self::Auth { message, .. }
            | Self::Storage { message, .. }
            | Self::Validation { message, .. }
            | Self::Unknown { message, .. } => message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Error returned when the list controller task is gone.
    pub(crate) fn controller_stopped() -> Self {
        Self::unknown("list controller stopped")
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_and_message() {
        let err = CoreError::network("connection reset");
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.message(), "connection reset");
        assert_eq!(err.to_string(), "network error: connection reset");
    }

    #[test]
    fn test_cause_is_exposed_as_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = CoreError::storage("write failed").with_cause(io);
        let source = err.source().expect("cause should be the source");
        assert_eq!(source.to_string(), "timed out");

        // Clones share the same cause
        let cloned = err.clone();
        assert!(cloned.source().is_some());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(CoreError::network("x").is_retryable());
        assert!(CoreError::storage("x").is_retryable());
        assert!(CoreError::unknown("x").is_retryable());
        assert!(!CoreError::validation("x").is_retryable());
        assert!(CoreError::auth("x").is_retryable());
    }
}
