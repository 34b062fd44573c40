//! The mirror request handler

use super::diagnostic::Diagnostics;
use super::path;
use super::pending::PendingFile;
use super::sidecar::SidecarWriter;
use super::validate::{self, MirrorEntry};
use super::writer::{MirrorOutcome, MirrorWriter, ResponseWriter};
use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info_span};
use ureq::http::{Method, Request};

/// The next stage of the request pipeline
pub trait Handler {
    fn serve(&self, req: &Request<()>, w: &mut dyn ResponseWriter) -> MirrorResult<()>;
}

impl<F> Handler for F
where
    F: Fn(&Request<()>, &mut dyn ResponseWriter) -> MirrorResult<()>,
{
    fn serve(&self, req: &Request<()>, w: &mut dyn ResponseWriter) -> MirrorResult<()> {
        self(req, w)
    }
}

/// Resolves `{name}` placeholders in configuration templates
pub trait Replacer {
    /// Substitute every placeholder, using `empty` for unknown or empty ones
    fn replace_all(&self, input: &str, empty: &str) -> String;
}

/// Map-backed [`Replacer`]
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    vars: HashMap<String, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholders for every environment variable as `{env.NAME}`
    pub fn from_env() -> Self {
        let vars = std::env::vars()
            .map(|(name, value)| (format!("env.{}", name), value))
            .collect();
        Self { vars }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }
}

impl Replacer for Placeholders {
    fn replace_all(&self, input: &str, empty: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                // Unterminated, keep verbatim
                out.push_str(&rest[open..]);
                rest = "";
                break;
            };
            match self.vars.get(&after[..close]) {
                Some(value) if !value.is_empty() => out.push_str(value),
                _ => out.push_str(empty),
            }
            rest = &after[close + 1..];
        }

        out.push_str(rest);
        out
    }
}

/// Why a request went to the next handler without mirroring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Method,
    DirectoryRequest,
    DirectoryTarget,
    Existing,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Method => "not a GET request",
            Self::DirectoryRequest => "directory request",
            Self::DirectoryTarget => "target is a directory",
            Self::Existing => "mirror exists and refresh is disabled",
        };
        write!(f, "{}", reason)
    }
}

/// What [`Mirror::serve`] did with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Passthrough(Skip),
    Mirrored {
        target: PathBuf,
        outcome: MirrorOutcome,
        bytes_written: u64,
        diagnostics: usize,
    },
}

/// Write-through mirror for GET responses.
///
/// One `Mirror` serves any number of requests concurrently; all per-request
/// state lives on the stack of [`Mirror::serve`].
#[derive(Debug, Clone)]
pub struct Mirror {
    config: MirrorConfig,
}

impl Mirror {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Serve `req` through `next`, mirroring a `200 OK` body under the root
    pub fn serve(
        &self,
        req: &Request<()>,
        w: &mut dyn ResponseWriter,
        repl: &dyn Replacer,
        next: &dyn Handler,
    ) -> MirrorResult<Disposition> {
        let url_path = req.uri().path();

        if req.method() != Method::GET {
            debug!(method = %req.method(), path = url_path, "Passing through non-GET request");
            return pass(req, w, next, Skip::Method);
        }
        if !url_path.starts_with('/') {
            return Err(MirrorError::InvalidRequest(url_path.to_string()));
        }
        if path::is_directory_request(url_path) {
            debug!(path = url_path, "Passing through directory request");
            return pass(req, w, next, Skip::DirectoryRequest);
        }

        let root = repl.replace_all(&self.config.root, ".");
        let span = info_span!("mirror", site_root = %root, request_path = url_path);
        let _guard = span.enter();

        let target = path::resolve(&root, url_path)?;
        match validate::classify(&target)? {
            MirrorEntry::Directory => {
                debug!(target = %target.display(), "Target is a directory, not mirroring");
                return pass(req, w, next, Skip::DirectoryTarget);
            }
            MirrorEntry::Irregular => return Err(MirrorError::NotRegular(target)),
            MirrorEntry::Regular { .. } if !self.config.refresh_existing => {
                debug!(target = %target.display(), "Mirror exists, not refreshing");
                return pass(req, w, next, Skip::Existing);
            }
            MirrorEntry::Regular { .. } | MirrorEntry::Absent => {}
        }

        debug!(target = %target.display(), "Creating pending mirror file");
        let file = match PendingFile::create(&target) {
            Ok(file) => file,
            // Lost a race with something creating a directory there
            Err(MirrorError::IsDirectory(_)) => return pass(req, w, next, Skip::DirectoryTarget),
            Err(e) => {
                error!(target = %target.display(), error = %e, "Failed to create pending mirror file");
                return Err(e);
            }
        };

        let mut diagnostics = Diagnostics::default();
        let sidecars = SidecarWriter::open(&target, &self.config, &mut diagnostics);
        let mut writer = MirrorWriter::new(w, file, sidecars, diagnostics);

        next.serve(req, &mut writer)?;
        writer.finish();

        Ok(Disposition::Mirrored {
            target,
            outcome: writer.outcome(),
            bytes_written: writer.bytes_written(),
            diagnostics: writer.diagnostics().len(),
        })
    }
}

fn pass(
    req: &Request<()>,
    w: &mut dyn ResponseWriter,
    next: &dyn Handler,
    skip: Skip,
) -> MirrorResult<Disposition> {
    next.serve(req, w)?;
    Ok(Disposition::Passthrough(skip))
}
