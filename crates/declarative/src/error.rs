//! Error types for reconciliation
//!
//! Collaborator failures carry an [`ErrorCategory`] so the engine can tell
//! "the resource does not exist" apart from every other failure. Not-found
//! is the only category ever absorbed, and only on read and cleanup paths.

use std::fmt;
use thiserror::Error;

/// Categories of collaborator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The resource does not exist
    NotFound,
    /// Credentials lack permission for the call
    AccessDenied,
    /// Rate limited by the provider (transient)
    Throttled,
    /// Conflicting concurrent modification or name clash
    Conflict,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient
    ///
    /// The reconciler never retries; this is informational for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled)
    }

    /// Get a user-friendly description of this error category
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::AccessDenied => "Access denied",
            Self::Throttled => "Request throttled",
            Self::Conflict => "Conflicting modification",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check the resource name and region",
            Self::AccessDenied => "Check the permissions granted to your credentials",
            Self::Throttled => "Wait a moment and re-run the deployment",
            Self::Conflict => "Another update may be in progress; re-run once it settles",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// An error reported by a compute, identity, storage or layer collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}: {message}")]
pub struct ProviderError {
    /// What kind of failure this is
    pub category: ErrorCategory,
    /// Provider-supplied detail
    pub message: String,
}

impl ProviderError {
    /// Create an error of the given category
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::AccessDenied, message)
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Throttled, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Conflict, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Other, message)
    }

    /// The provider's documented "not found" signal
    pub fn is_not_found(&self) -> bool {
        self.category == ErrorCategory::NotFound
    }

    /// Whether the failure is typically transient
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

/// Result type for collaborator calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors that abort a reconciliation run
///
/// A run either reaches its terminal stage or stops at the first of these,
/// leaving previously persisted state untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad archive format in the desired configuration
    #[error("unsupported archive format: {0}")]
    InvalidFormat(String),

    /// IO failure while building or reading the artifact
    #[error("packaging failed: {0}")]
    PackagingFailed(#[source] packager::Error),

    /// Reading the deployed function failed for a reason other than absence
    #[error("failed to read remote state of '{name}': {source}")]
    RemoteReadFailed {
        name: String,
        #[source]
        source: ProviderError,
    },

    /// A create/update/delete/upload call failed
    #[error("{operation} failed for '{target}': {source}")]
    ProviderCallFailed {
        operation: &'static str,
        target: String,
        #[source]
        source: ProviderError,
    },

    /// Looking up, creating or removing the execution role failed
    #[error("failed to provision execution role '{role}': {source}")]
    RoleProvisioningFailed {
        role: String,
        #[source]
        source: ProviderError,
    },

    /// The desired configuration cannot be reconciled with the given clients
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn call(operation: &'static str, target: impl Into<String>, source: ProviderError) -> Self {
        Self::ProviderCallFailed {
            operation,
            target: target.into(),
            source,
        }
    }

    /// The collaborator error behind this failure, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::RemoteReadFailed { source, .. }
            | Self::ProviderCallFailed { source, .. }
            | Self::RoleProvisioningFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<packager::Error> for Error {
    fn from(err: packager::Error) -> Self {
        match err {
            packager::Error::InvalidFormat(format) => Self::InvalidFormat(format),
            other => Self::PackagingFailed(other),
        }
    }
}

/// Result type for reconciliation
pub type Result<T> = std::result::Result<T, Error>;

/// Treat not-found as success, reporting whether anything was there
pub(crate) fn tolerate_missing(result: ProviderResult<()>) -> ProviderResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
