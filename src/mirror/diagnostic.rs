//! Non-fatal diagnostics for best-effort mirror operations
//!
//! Anything reported here has already lost the chance to change the
//! response. There is intentionally no conversion from [`Diagnostic`] into
//! [`MirrorError`], so `?` cannot leak one into a request result.

use crate::error::MirrorError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// A best-effort failure that is logged and otherwise ignored
#[derive(Error, Debug)]
pub enum Diagnostic {
    #[error("failed to create sidecar temp file for {path}: {source}")]
    SidecarCreate {
        path: PathBuf,
        #[source]
        source: MirrorError,
    },

    #[error("failed to write sidecar {path}: {source}")]
    SidecarWrite {
        path: PathBuf,
        #[source]
        source: MirrorError,
    },

    #[error("failed to set {name} on {path}: {source}")]
    Attribute {
        name: &'static str,
        path: PathBuf,
        #[source]
        source: MirrorError,
    },

    #[error("hashing disabled after {hashed} bytes: {source}")]
    Hashing {
        hashed: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to complete {path}: {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: MirrorError,
    },

    #[error("failed to discard pending file for {path}: {source}")]
    Discard {
        path: PathBuf,
        #[source]
        source: MirrorError,
    },

    #[error("failed to discard pending file for {path} on release: {source}")]
    ImplicitAbort {
        path: PathBuf,
        #[source]
        source: MirrorError,
    },

    #[error("response for {path} ended after {written} of {expected} bytes")]
    Incomplete {
        path: PathBuf,
        written: u64,
        expected: u64,
    },
}

impl Diagnostic {
    /// Emit the diagnostic to the log sink
    pub fn report(&self) {
        match self {
            Self::Incomplete { .. } | Self::Hashing { .. } => warn!("{}", self),
            Self::Finalize { source, .. }
            | Self::Discard { source, .. }
            | Self::ImplicitAbort { source, .. }
                if source.is_invariant_violation() =>
            {
                error!(invariant = true, "{}", self)
            }
            _ => error!("{}", self),
        }
    }
}

/// Diagnostics collected over the lifetime of one request
#[derive(Debug, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Report and keep a diagnostic
    pub fn record(&mut self, diagnostic: Diagnostic) {
        diagnostic.report();
        self.0.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}
