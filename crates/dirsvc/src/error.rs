//! Directory service error types
//!
//! Error definitions with transient/permanent classification. Only `NotFound`
//! and `Ambiguous` are meant for callers of single-identifier lookups; backend
//! faults on paged queries are degraded to partial results by the search
//! orchestrator.

use thiserror::Error;

use crate::identity::IdentityError;

/// Error that can occur during directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Lookup outcomes
    /// A single-identifier lookup matched no entry.
    #[error("no results returned for query: '{query}'")]
    NotFound { query: String },

    /// A single-identifier lookup matched more than one entry.
    #[error("multiple results returned for query: '{query}'")]
    Ambiguous { query: String },

    // Backend errors (usually transient)
    /// Failed to reach the directory server.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Bind was rejected.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// The search request itself failed.
    #[error("search failed: {message}")]
    SearchFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Caller errors (permanent)
    /// Settings are unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A SID or GUID string could not be encoded.
    #[error("invalid identifier: {message}")]
    InvalidIdentifier { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DirectoryError {
    /// Check if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. } | DirectoryError::SearchFailed { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::NotFound { .. } => "NOT_FOUND",
            DirectoryError::Ambiguous { .. } => "AMBIGUOUS",
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::AuthenticationFailed => "AUTH_FAILED",
            DirectoryError::SearchFailed { .. } => "SEARCH_FAILED",
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirectoryError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            DirectoryError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a search failed error.
    pub fn search_failed(message: impl Into<String>) -> Self {
        DirectoryError::SearchFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a search failed error with source.
    pub fn search_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::SearchFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        DirectoryError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this is one of the two lookup outcomes rather than a fault.
    pub fn is_lookup_outcome(&self) -> bool {
        matches!(
            self,
            DirectoryError::NotFound { .. } | DirectoryError::Ambiguous { .. }
        )
    }
}

impl From<IdentityError> for DirectoryError {
    fn from(err: IdentityError) -> Self {
        DirectoryError::InvalidIdentifier {
            message: err.to_string(),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
