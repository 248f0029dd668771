//! Error types for the dnsync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for dnsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the dnsync system
#[derive(Error, Debug)]
pub enum Error {
    /// The auth secret or its `authToken` key could not be resolved
    #[error("Credential resolution failed: {0}")]
    Credentials(String),

    /// The target address could not be resolved (public IP detection)
    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Writing the status merge patch failed
    #[error("Status patch failed: {0}")]
    StatusPatch(String),

    /// Resource store errors
    #[error("Resource store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a credential resolution error
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    /// Create an address resolution error
    pub fn address(msg: impl Into<String>) -> Self {
        Self::AddressResolution(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a status patch error
    pub fn status_patch(msg: impl Into<String>) -> Self {
        Self::StatusPatch(msg.into())
    }

    /// Create a resource store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error came out of a provider strategy
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = Error::provider("cloudflare", "zone not found");
        assert_eq!(err.to_string(), "Provider error (cloudflare): zone not found");
        assert!(err.is_provider());
        assert!(!Error::credentials("missing").is_provider());
    }
}
