//! Device-scope cache error types.

use std::fmt;

use edge_identity::{DirectoryError, StoreError};

use crate::config::ConfigError;

/// Result type for scope cache operations.
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Errors that can occur during scope cache operations.
///
/// Only [`ScopeError::OutOfScope`] and [`ScopeError::Disabled`] are
/// authorization outcomes. They are produced by
/// [`DeviceScopeCache::verify`](crate::DeviceScopeCache::verify) and nowhere else.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// The identity was never seen in scope, or has been removed from it.
    #[error("Identity not in device scope: {id}")]
    OutOfScope {
        /// The identity that was checked.
        id: String,
    },

    /// The identity is in scope but disabled.
    #[error("Identity disabled: {id}")]
    Disabled {
        /// The identity that was checked.
        id: String,
    },

    /// The identity directory could not be queried.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The durable store rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored record could not be encoded or decoded.
    #[error("Invalid stored identity {id}: {message}")]
    InvalidRecord {
        /// Store key of the record.
        id: String,
        /// Description of the problem.
        message: String,
    },

    /// The cache configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

impl ScopeError {
    /// Creates a new `OutOfScope` error.
    #[must_use]
    pub fn out_of_scope(id: impl Into<String>) -> Self {
        Self::OutOfScope { id: id.into() }
    }

    /// Creates a new `Disabled` error.
    #[must_use]
    pub fn disabled(id: impl Into<String>) -> Self {
        Self::Disabled { id: id.into() }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a definitive authorization decision.
    #[must_use]
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, Self::OutOfScope { .. } | Self::Disabled { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::OutOfScope { .. } | Self::Disabled { .. } => ErrorCategory::Authorization,
            Self::Directory(_) => ErrorCategory::Directory,
            Self::Store(_) | Self::InvalidRecord { .. } => ErrorCategory::Storage,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Categories of scope cache errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authorization decisions.
    Authorization,
    /// Upstream directory failures.
    Directory,
    /// Durable store and record encoding failures.
    Storage,
    /// Configuration errors.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorization => write!(f, "authorization"),
            Self::Directory => write!(f, "directory"),
            Self::Storage => write!(f, "storage"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ScopeError::out_of_scope("d1").to_string(),
            "Identity not in device scope: d1"
        );
        assert_eq!(
            ScopeError::disabled("d1/m1").to_string(),
            "Identity disabled: d1/m1"
        );
        assert_eq!(
            ScopeError::from(DirectoryError::unavailable("offline")).to_string(),
            "Directory unavailable: offline"
        );
    }

    #[test]
    fn test_authorization_predicate() {
        assert!(ScopeError::out_of_scope("d1").is_authorization_failure());
        assert!(ScopeError::disabled("d1").is_authorization_failure());
        assert!(!ScopeError::from(StoreError::io("disk")).is_authorization_failure());
        assert!(!ScopeError::invalid_record("d1", "bad json").is_authorization_failure());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            ScopeError::disabled("d1").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            ScopeError::from(DirectoryError::timeout("list")).category(),
            ErrorCategory::Directory
        );
        assert_eq!(
            ScopeError::from(StoreError::io("disk")).category(),
            ErrorCategory::Storage
        );
        assert_eq!(ErrorCategory::Storage.to_string(), "storage");
    }
}
