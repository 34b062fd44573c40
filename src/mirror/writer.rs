//! Response writer decoration
//!
//! [`MirrorWriter`] sits in front of the real [`ResponseWriter`] and copies
//! every body byte of a `200 OK` response into a [`PendingFile`] before
//! forwarding it. Mirroring never changes what the client receives, with
//! one exception: a failed write to the mirror file fails the response
//! write, so client and mirror cannot silently diverge.

use super::diagnostic::{Diagnostic, Diagnostics};
use super::digest::ContentHasher;
use super::pending::PendingFile;
use super::sidecar::SidecarWriter;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use ureq::http::header::{CONTENT_LENGTH, ETAG};
use ureq::http::{HeaderMap, StatusCode};

/// The outbound half of an HTTP exchange
pub trait ResponseWriter {
    /// Headers that will be sent with `write_header`
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Send the status line and headers
    fn write_header(&mut self, status: StatusCode);

    /// Send body bytes, implying `200 OK` if no header was sent yet
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// What became of the mirror file for one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Still collecting body bytes
    Pending,
    /// Renamed onto the target
    Published,
    /// Removed without touching the target
    Discarded,
}

impl fmt::Display for MirrorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Discarded => "discarded",
        };
        write!(f, "{}", name)
    }
}

/// Decorator that mirrors a response body into a pending file
pub struct MirrorWriter<'w, W: ResponseWriter + ?Sized> {
    inner: &'w mut W,
    target: PathBuf,
    file: Option<PendingFile>,
    sidecars: SidecarWriter,
    hash_bodies: bool,
    hasher: Option<ContentHasher>,
    status: Option<StatusCode>,
    bytes_expected: Option<u64>,
    bytes_written: u64,
    outcome: MirrorOutcome,
    diagnostics: Diagnostics,
}

impl<'w, W: ResponseWriter + ?Sized> MirrorWriter<'w, W> {
    /// Wrap `inner`, mirroring into `file` and `sidecars`.
    ///
    /// `diagnostics` carries anything already reported while the
    /// sidecars were opened.
    pub fn new(
        inner: &'w mut W,
        file: PendingFile,
        sidecars: SidecarWriter,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            inner,
            target: file.target().to_path_buf(),
            hash_bodies: sidecars.wants_digest(),
            file: Some(file),
            sidecars,
            hasher: None,
            status: None,
            bytes_expected: None,
            bytes_written: 0,
            outcome: MirrorOutcome::Pending,
            diagnostics,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn outcome(&self) -> MirrorOutcome {
        self.outcome
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Signal the end of the body.
    ///
    /// Publishes a mirror whose length was not declared; a declared length
    /// that was never reached discards it instead.
    pub fn finish(&mut self) {
        if self.file.is_none() {
            return;
        }
        if self.status.is_none() {
            debug!("Response ended before any header, discarding mirror");
            self.discard();
            return;
        }
        match self.bytes_expected {
            Some(expected) if expected != self.bytes_written => {
                self.diagnostics.record(Diagnostic::Incomplete {
                    path: self.target.clone(),
                    written: self.bytes_written,
                    expected,
                });
                self.discard();
            }
            _ => self.finalize(),
        }
    }

    fn begin(&mut self) {
        let headers = self.inner.headers();
        self.bytes_expected = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());
        let etag = headers
            .get(ETAG)
            .map(|value| value.as_bytes().to_vec())
            .filter(|value| !value.is_empty());

        if let (Some(etag), Some(file)) = (etag, self.file.as_mut()) {
            self.sidecars
                .record_etag(file, &etag, &mut self.diagnostics);
        }
        if self.hash_bodies {
            self.hasher = Some(ContentHasher::new());
        }
    }

    fn mirror_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        if let Some(hasher) = self.hasher.as_mut() {
            if let Err(partial) = hasher.update(data) {
                self.diagnostics.record(Diagnostic::Hashing {
                    hashed: hasher.hashed(),
                    source: partial.source,
                });
                self.hasher = None;
            }
        }

        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        match file.write(data) {
            Ok(written) => self.bytes_written += written as u64,
            Err(err) => {
                error!("Failed to write mirror file {}: {}", self.target.display(), err);
                self.discard();
                return Err(io::Error::other(err));
            }
        }

        if self
            .bytes_expected
            .is_some_and(|expected| expected > 0 && expected == self.bytes_written)
        {
            debug!(
                bytes_written = self.bytes_written,
                "Mirror file fully written"
            );
            self.finalize();
        }
        Ok(())
    }

    fn finalize(&mut self) {
        let Some(mut file) = self.file.take() else {
            return;
        };
        match self.hasher.take() {
            Some(hasher) => {
                let digest = hasher.finish();
                debug!(sha256 = %digest, "Hash done");
                self.sidecars
                    .record_digest(&mut file, &digest, &mut self.diagnostics);
            }
            // An empty digest sidecar would claim a digest that was never taken
            None => self.sidecars.abort_digest(&mut self.diagnostics),
        }

        match file.complete() {
            Ok(()) => {
                self.sidecars.complete(&mut self.diagnostics);
                self.outcome = MirrorOutcome::Published;
            }
            Err(source) => {
                self.diagnostics.record(Diagnostic::Finalize {
                    path: self.target.clone(),
                    source,
                });
                self.sidecars.abort(&mut self.diagnostics);
                self.outcome = MirrorOutcome::Discarded;
            }
        }
    }

    fn discard(&mut self) {
        let Some(mut file) = self.file.take() else {
            return;
        };
        self.hasher = None;
        self.sidecars.abort(&mut self.diagnostics);
        if let Err(source) = file.abort() {
            self.diagnostics.record(Diagnostic::Discard {
                path: self.target.clone(),
                source,
            });
        }
        self.outcome = MirrorOutcome::Discarded;
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for MirrorWriter<'_, W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        debug!(status_code = status.as_u16(), "WriteHeader");
        if self.status.is_none() {
            self.status = Some(status);
            if status == StatusCode::OK {
                self.begin();
            } else {
                // Error pages are never mirrored
                self.discard();
            }
        }
        self.inner.write_header(status);
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        if !data.is_empty() && self.file.is_some() {
            self.mirror_chunk(data)?;
        }
        self.inner.write(data)
    }
}

impl<W: ResponseWriter + ?Sized> Drop for MirrorWriter<'_, W> {
    fn drop(&mut self) {
        if self.file.is_some() {
            debug!(
                bytes_written = self.bytes_written,
                "Request ended before the mirror was finalized"
            );
            self.discard();
        }
    }
}

/// A [`ResponseWriter`] that streams the body into any [`Write`]
#[derive(Debug, Default)]
pub struct StreamResponse<O> {
    status: Option<StatusCode>,
    headers: HeaderMap,
    out: O,
}

impl<O: Write> StreamResponse<O> {
    pub fn new(out: O) -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            out,
        }
    }

    /// Status sent so far, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn get_ref(&self) -> &O {
        &self.out
    }

    pub fn into_inner(self) -> O {
        self.out
    }
}

impl<O: Write> ResponseWriter for StreamResponse<O> {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.out.write_all(data)?;
        Ok(data.len())
    }
}
