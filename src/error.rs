//! Error types for the GitLab provider.

use thiserror::Error;

/// Errors that can occur while serving GitLab resources.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A persisted identity string could not be decoded.
    #[error("Malformed identifier '{id}': {reason}")]
    MalformedIdentifier {
        /// The offending identity string.
        id: String,
        /// Why decoding failed.
        reason: String,
    },

    /// Legacy state cannot be mapped to a single identity variant.
    #[error("Ambiguous legacy state: {0}")]
    AmbiguousLegacyState(String),

    /// Local configuration or state failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// GitLab rejected the request payload.
    #[error("Remote validation error: {0}")]
    RemoteValidation(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Quota or rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// GitLab is temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Any other non-success response from GitLab.
    #[error("GitLab API error ({status}): {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Response body as returned by GitLab.
        message: String,
    },

    /// A delete was issued but the object was still observable when the
    /// polling window closed.
    #[error("Deletion still pending: {0}")]
    DeletionPending(String),

    /// The operation's deadline elapsed.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The operation was cancelled by the host.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A provider configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The resource table is inconsistent.
    #[error("Registration error: {0}")]
    Registration(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP transport failed before GitLab answered.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProviderError {
    /// Shorthand for a [`ProviderError::MalformedIdentifier`].
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the remote object is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Get the error message as a string.
    ///
    /// Returns a reference to the error message for any variant.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::MalformedIdentifier { reason, .. } => reason,
            Self::AmbiguousLegacyState(msg) => msg,
            Self::Validation(msg) => msg,
            Self::RemoteValidation(msg) => msg,
            Self::PermissionDenied(msg) => msg,
            Self::ResourceExhausted(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::Remote { message, .. } => message,
            Self::DeletionPending(msg) => msg,
            Self::DeadlineExceeded(msg) => msg,
            Self::Cancelled(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Registration(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Transport(_err) => "transport error (see Debug output)",
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;
