//! Response metadata kept alongside a mirror file
//!
//! The ETag and the body digest can be stored in sibling files named
//! `<target><suffix>` and/or as extended attributes on the target itself.
//! Sidecar files are [`PendingFile`]s of their own and are only published
//! after the primary mirror file.

use super::diagnostic::{Diagnostic, Diagnostics};
use super::digest::ContentDigest;
use super::pending::PendingFile;
use crate::config::MirrorConfig;
use crate::error::MirrorResult;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extended attribute holding the upstream ETag
pub const ETAG_ATTRIBUTE: &str = "user.xdg.origin.etag";

/// Extended attribute holding the hex SHA-256 of the body
pub const SHA256_ATTRIBUTE: &str = "user.xdg.origin.sha256";

/// Path of the sidecar for `target` with the given suffix
pub fn sidecar_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Pending metadata for one mirror target
#[derive(Debug, Default)]
pub struct SidecarWriter {
    etag_file: Option<PendingFile>,
    digest_file: Option<PendingFile>,
    etag_attribute: bool,
    digest_attribute: bool,
}

impl SidecarWriter {
    /// Open the sidecar files `config` asks for.
    ///
    /// A sidecar that cannot be created is reported and skipped; the
    /// primary mirror still proceeds.
    pub fn open(target: &Path, config: &MirrorConfig, diagnostics: &mut Diagnostics) -> Self {
        let open = |suffix: &str, diagnostics: &mut Diagnostics| -> Option<PendingFile> {
            if suffix.is_empty() {
                return None;
            }
            let path = sidecar_path(target, suffix);
            match PendingFile::create(&path) {
                Ok(file) => Some(file),
                Err(source) => {
                    diagnostics.record(Diagnostic::SidecarCreate { path, source });
                    None
                }
            }
        };

        Self {
            etag_file: open(&config.etag_file_suffix, &mut *diagnostics),
            digest_file: open(&config.sha256_file_suffix, &mut *diagnostics),
            etag_attribute: config.xattr,
            digest_attribute: config.sha256_xattr,
        }
    }

    /// Whether anything will persist a body digest
    pub fn wants_digest(&self) -> bool {
        self.digest_attribute || self.digest_file.is_some()
    }

    /// Persist the raw ETag header value
    pub fn record_etag(
        &mut self,
        primary: &mut PendingFile,
        etag: &[u8],
        diagnostics: &mut Diagnostics,
    ) {
        if self.etag_attribute {
            if let Err(source) = primary.set_attribute(ETAG_ATTRIBUTE, etag) {
                diagnostics.record(Diagnostic::Attribute {
                    name: ETAG_ATTRIBUTE,
                    path: primary.target().to_path_buf(),
                    source,
                });
            }
        }
        write_sidecar(&mut self.etag_file, etag, diagnostics);
    }

    /// Persist the finished body digest
    pub fn record_digest(
        &mut self,
        primary: &mut PendingFile,
        digest: &ContentDigest,
        diagnostics: &mut Diagnostics,
    ) {
        let hex = digest.to_hex();
        if self.digest_attribute {
            if let Err(source) = primary.set_attribute(SHA256_ATTRIBUTE, hex.as_bytes()) {
                diagnostics.record(Diagnostic::Attribute {
                    name: SHA256_ATTRIBUTE,
                    path: primary.target().to_path_buf(),
                    source,
                });
            }
        }
        write_sidecar(&mut self.digest_file, hex.as_bytes(), diagnostics);
    }

    /// Discard the digest sidecar when no digest will be recorded
    pub fn abort_digest(&mut self, diagnostics: &mut Diagnostics) {
        if let Some(file) = self.digest_file.take() {
            finish(file, PendingFile::abort, diagnostics, |path, source| {
                Diagnostic::Discard { path, source }
            });
        }
    }

    /// Publish every sidecar; call only after the primary file completed
    pub fn complete(&mut self, diagnostics: &mut Diagnostics) {
        for file in [self.etag_file.take(), self.digest_file.take()].into_iter().flatten() {
            finish(file, PendingFile::complete, diagnostics, |path, source| {
                Diagnostic::Finalize { path, source }
            });
        }
    }

    /// Discard every sidecar
    pub fn abort(&mut self, diagnostics: &mut Diagnostics) {
        for file in [self.etag_file.take(), self.digest_file.take()].into_iter().flatten() {
            finish(file, PendingFile::abort, diagnostics, |path, source| {
                Diagnostic::Discard { path, source }
            });
        }
    }
}

fn write_sidecar(slot: &mut Option<PendingFile>, data: &[u8], diagnostics: &mut Diagnostics) {
    let Some(file) = slot.as_mut() else {
        return;
    };
    if let Err(source) = file.write(data) {
        diagnostics.record(Diagnostic::SidecarWrite {
            path: file.target().to_path_buf(),
            source,
        });
        // Never publish a partial sidecar
        if let Some(file) = slot.take() {
            finish(file, PendingFile::abort, diagnostics, |path, source| {
                Diagnostic::Discard { path, source }
            });
        }
    }
}

fn finish(
    mut file: PendingFile,
    step: fn(&mut PendingFile) -> MirrorResult<()>,
    diagnostics: &mut Diagnostics,
    report: impl FnOnce(PathBuf, crate::error::MirrorError) -> Diagnostic,
) {
    if let Err(source) = step(&mut file) {
        diagnostics.record(report(file.target().to_path_buf(), source));
    }
}

/// Metadata found next to an existing mirror file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SidecarRecord {
    pub etag: Option<String>,
    pub sha256: Option<String>,
    pub etag_attribute: Option<String>,
    pub sha256_attribute: Option<String>,
}

impl SidecarRecord {
    /// Read whatever sidecars and attributes exist for `target`
    pub fn load(target: &Path, config: &MirrorConfig) -> io::Result<Self> {
        Ok(Self {
            etag: read_sidecar(target, &config.etag_file_suffix)?,
            sha256: read_sidecar(target, &config.sha256_file_suffix)?,
            etag_attribute: read_attribute(target, ETAG_ATTRIBUTE)?,
            sha256_attribute: read_attribute(target, SHA256_ATTRIBUTE)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn read_sidecar(target: &Path, suffix: &str) -> io::Result<Option<String>> {
    if suffix.is_empty() {
        return Ok(None);
    }
    match fs::read(sidecar_path(target, suffix)) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn read_attribute(target: &Path, name: &str) -> io::Result<Option<String>> {
    match xattr::get(target, name) {
        Ok(value) => Ok(value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())),
        // Filesystems without user xattrs simply have none
        Err(e) if e.raw_os_error() == Some(libc::ENOTSUP) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::Unsupported => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn read_attribute(_target: &Path, _name: &str) -> io::Result<Option<String>> {
    Ok(None)
}
