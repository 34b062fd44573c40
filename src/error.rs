//! Error types for mirrorfs
//!
//! All request-affecting operations return `MirrorResult<T>`. Failures that
//! must never reach the client live in [`crate::mirror::Diagnostic`] instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use ureq::http::StatusCode;

/// Result type alias for mirrorfs operations
pub type MirrorResult<T> = Result<T, MirrorError>;

/// All errors that can change the outcome of a request or a command
#[derive(Error, Debug)]
pub enum MirrorError {
    // Request errors
    #[error("URL path {0:?} is not absolute")]
    InvalidRequest(String),

    #[error("Permission denied: {path}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Mirror target is a directory: {0}")]
    IsDirectory(PathBuf),

    #[error("Mirror target is not a regular file: {0}")]
    NotRegular(PathBuf),

    // Pending file errors
    #[error("Write to {path} made no progress after {written} bytes")]
    NoProgress {
        path: PathBuf,
        written: usize,
        #[source]
        source: io::Error,
    },

    #[error("Pending file for {0} was already completed")]
    AlreadyCompleted(PathBuf),

    #[error("Pending file for {0} was already aborted")]
    AlreadyAborted(PathBuf),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {context} (cleanup also failed: {cleanup})")]
    IoWithCleanup {
        context: String,
        #[source]
        source: io::Error,
        cleanup: io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // Upstream errors
    #[error("Upstream request to {url} failed: {reason}")]
    Upstream { url: String, reason: String },

    #[error("No upstream configured")]
    NoUpstream,

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an IO error for `path`, classifying permission failures
    pub fn fs(context: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.into(),
                source,
            }
        } else {
            Self::io(context, source)
        }
    }

    /// Join a primary failure with the result of cleaning up after it
    pub fn with_cleanup(self, cleanup: Option<io::Error>) -> Self {
        match (self, cleanup) {
            (Self::Io { context, source }, Some(cleanup)) => Self::IoWithCleanup {
                context,
                source,
                cleanup,
            },
            (err, _) => err,
        }
    }

    /// HTTP status the surrounding pipeline should answer with
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PermissionDenied { .. } | Self::NotRegular(_) => StatusCode::FORBIDDEN,
            Self::Upstream { .. } | Self::NoUpstream => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Programming-invariant violations that correct callers never trigger
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::AlreadyCompleted(_) | Self::AlreadyAborted(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied { .. } => Some("Check ownership of the mirror root"),
            Self::NotRegular(_) => Some("Remove the special file or pick another root"),
            Self::NoUpstream => Some("Pass --upstream or set upstream.base_url in config"),
            Self::ConfigInvalid { .. } => Some("Run: mirrorfs config init --force"),
            _ => None,
        }
    }
}
