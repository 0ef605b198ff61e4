//! Error types for the clientlib cache
//!
//! All modules use `ClientlibResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for clientlib operations
pub type ClientlibResult<T> = Result<T, ClientlibError>;

/// All errors that can occur while building, caching and serving clientlibs
#[derive(Error, Debug)]
pub enum ClientlibError {
    // Asset errors
    #[error("Clientlib not found: {0}")]
    AssetNotFound(String),

    #[error("Clientlib {path} of type '{kind}' has no content processor")]
    Unprocessable { path: String, kind: String },

    #[error("Unknown clientlib type: {0}")]
    UnknownKind(String),

    // Build errors
    #[error("Building {key} failed: {reason}")]
    BuildFailed { key: String, reason: String },

    #[error("Build worker pool unavailable: {0}")]
    WorkerPool(String),

    // Cache store errors
    #[error("Cache key {0} cannot be mapped to a store location")]
    InvalidKey(String),

    // Lifecycle errors
    #[error("Clientlib service is shutting down")]
    ServiceShutdown,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientlibError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a build failure for a cache key
    pub fn build_failed(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::BuildFailed {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AssetNotFound(_) => Some("Check library.root in the configuration"),
            Self::Unprocessable { .. } => Some("Only js and css clientlibs can be prepared"),
            Self::ConfigInvalid { .. } => Some("Run: clientlib config init --force"),
            Self::UnknownKind(_) => Some("Valid types are js, css and link"),
            Self::BuildFailed { .. } => Some("Failed builds are never cached, run the command again"),
            _ => None,
        }
    }
}
