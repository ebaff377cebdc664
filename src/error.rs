//! Error types for the registry rewriter

use thiserror::Error;

use crate::registry::RewriteError;

/// Main error type for registry rewriter operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Image reference or target registry failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// The namespace of an admitted Pod could not be resolved
    #[error("namespace lookup error: {0}")]
    NamespaceLookup(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid server or manifest configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The webhook server failed while running
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a namespace lookup error with the given message
    pub fn namespace_lookup(msg: impl Into<String>) -> Self {
        Self::NamespaceLookup(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a server error with the given message
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }
}

impl From<RewriteError> for Error {
    fn from(e: RewriteError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
