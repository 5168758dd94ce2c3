//! Error types for the identity directory and durable store collaborators.

use std::fmt;

/// Result type for identity directory calls.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Result type for durable store calls.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Directory Error
// =============================================================================

/// Errors returned by an [`IdentityDirectory`](crate::IdentityDirectory).
///
/// Only [`DirectoryError::InvalidState`] is a statement about the identity.
/// Every other variant means the directory could not answer and the caller
/// should keep whatever it knew before.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// The directory confirmed the identity is out of scope or disabled.
    #[error("Invalid identity state for {id}: {message}")]
    InvalidState {
        /// The identity the directory answered for.
        id: String,
        /// Description from the directory.
        message: String,
    },

    /// The directory could not be reached.
    #[error("Directory unavailable: {message}")]
    Unavailable {
        /// Description of the connectivity failure.
        message: String,
    },

    /// The directory answered with a service error.
    #[error("Directory service error: status {status} - {message}")]
    Service {
        /// Status code reported by the service.
        status: u16,
        /// Description of the error.
        message: String,
    },

    /// The call did not complete in time.
    #[error("Directory request timed out: {message}")]
    Timeout {
        /// Description of the timed-out operation.
        message: String,
    },

    /// An unexpected client-side error occurred.
    #[error("Directory client error: {message}")]
    Internal {
        /// Description of the error.
        message: String,
    },
}

impl DirectoryError {
    /// Creates a new `InvalidState` error.
    #[must_use]
    pub fn invalid_state(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Service` error.
    #[must_use]
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the directory confirmed the identity is out of scope.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Returns `true` if the failure says nothing about the identity itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !self.is_invalid_state()
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidState { .. } => ErrorCategory::Scope,
            Self::Unavailable { .. } | Self::Timeout { .. } => ErrorCategory::Connectivity,
            Self::Service { .. } => ErrorCategory::Service,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Errors returned by a [`KeyValueStore`](crate::KeyValueStore).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing medium failed.
    #[error("Store I/O error: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
    },

    /// Persisted data could not be encoded or decoded.
    #[error("Store serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The store is closed or not accepting writes.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of why the store is unavailable.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Io` error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io { .. } | Self::Unavailable { .. } => ErrorCategory::Storage,
            Self::Serialization { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

// =============================================================================
// Error Category
// =============================================================================

/// Categories of collaborator errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The directory made a definitive statement about scope.
    Scope,
    /// The directory could not be reached in time.
    Connectivity,
    /// The directory answered with an error.
    Service,
    /// Durable storage failures.
    Storage,
    /// Unexpected errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope => write!(f, "scope"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::Service => write!(f, "service"),
            Self::Storage => write!(f, "storage"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
