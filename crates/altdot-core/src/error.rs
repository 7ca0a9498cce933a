//! Error types for altdot-core

use thiserror::Error;

/// Result type alias using altdot-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type for the extension lifecycle crates
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest failed validation; the message is suitable for direct display
    #[error("{message}")]
    Validation { message: String },

    /// Operating on an extension that does not exist
    #[error("couldn't find {what}")]
    NotFound { what: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Relational store error
    #[error("database error: {message}")]
    Database { message: String },

    /// Registry or download failure
    #[error("network error: {message}")]
    Network { message: String },

    /// Bundle archive failure
    #[error("archive error: {message}")]
    Archive { message: String },
}

impl Error {
    /// Create a validation error from a display-ready message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error; `what` names the missing thing ("extension")
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a database error from any displayable source
    pub fn database(source: impl std::fmt::Display) -> Self {
        Self::Database {
            message: source.to_string(),
        }
    }

    /// Create a network error from any displayable source
    pub fn network(source: impl std::fmt::Display) -> Self {
        Self::Network {
            message: source.to_string(),
        }
    }

    /// Create an archive error from any displayable source
    pub fn archive(source: impl std::fmt::Display) -> Self {
        Self::Archive {
            message: source.to_string(),
        }
    }

    /// Whether this error is the validation kind (renderable verbatim by a UI)
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Whether this error is the not-found kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<crate::manifest::ManifestError> for Error {
    fn from(err: crate::manifest::ManifestError) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}
