//! Temporary files that are published onto their target exactly once
//!
//! A [`PendingFile`] lives next to its target as `.<name>.<random>.partial`
//! so that publishing is a single `rename(2)` within one directory. Readers of
//! the target see either the previous content or the complete new content,
//! never a prefix.
//!
//! # States
//!
//! | State | Entered by | Temp file |
//! |-------|------------|-----------|
//! | Open | `create` | present, writable |
//! | Completed | `complete` | renamed onto target |
//! | Aborted | `abort`, failed `complete`, drop while open | removed |

use super::diagnostic::Diagnostic;
use super::validate;
use crate::error::{MirrorError, MirrorResult};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};
use tracing::{debug, error};

const TEMP_SUFFIX: &str = ".partial";

/// Lifecycle of a [`PendingFile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Open,
    Completed,
    Aborted,
}

/// A write that stopped before consuming all of its input
#[derive(Debug)]
pub(crate) struct PartialWrite {
    pub written: usize,
    pub source: io::Error,
}

/// Write all of `data`, retrying short writes.
///
/// A write that accepts zero bytes without an error is reported as
/// `WriteZero` instead of being retried forever.
pub(crate) fn write_fully<W: Write + ?Sized>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), PartialWrite> {
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(0) => {
                return Err(PartialWrite {
                    written,
                    source: io::Error::new(io::ErrorKind::WriteZero, "not making progress"),
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => return Err(PartialWrite { written, source }),
        }
    }
    Ok(())
}

/// An in-flight write to a mirror target
#[derive(Debug)]
pub struct PendingFile {
    target: PathBuf,
    temp: Option<TempPath>,
    writer: Option<BufWriter<File>>,
    state: PendingState,
}

impl PendingFile {
    /// Create a temp file next to `target`, creating parent directories.
    ///
    /// A prior regular file at `target` lends its permission bits to the
    /// new file. Directories and special files are refused.
    pub fn create(target: &Path) -> MirrorResult<Self> {
        let name = target.file_name().ok_or_else(|| {
            MirrorError::io(
                format!("creating pending file for {}", target.display()),
                io::Error::new(io::ErrorKind::InvalidInput, "target has no file name"),
            )
        })?;
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // Mode 0o777 before umask
        fs::DirBuilder::new()
            .recursive(true)
            .create(dir)
            .map_err(|e| MirrorError::fs(format!("creating directory {}", dir.display()), dir, e))?;

        let prior = validate::classify(target)?.ensure_writable(target)?;

        let prefix = format!(".{}.", name.to_string_lossy());
        let mut builder = Builder::new();
        builder.prefix(&prefix).suffix(TEMP_SUFFIX);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(0o666));
        }
        let temp = builder.tempfile_in(dir).map_err(|e| {
            MirrorError::fs(
                format!("creating temp file for {}", target.display()),
                target,
                e,
            )
        })?;

        if let Some(permissions) = prior {
            let copied = temp.as_file().metadata().and_then(|meta| {
                if meta.permissions() == permissions {
                    Ok(())
                } else {
                    temp.as_file().set_permissions(permissions)
                }
            });
            if let Err(e) = copied {
                let context = format!("copying permissions onto temp file for {}", target.display());
                let cleanup = temp.close().err();
                return Err(MirrorError::fs(context, target, e).with_cleanup(cleanup));
            }
        }

        let (file, temp) = temp.into_parts();
        debug!("Created pending file {}", temp.display());

        Ok(Self {
            target: target.to_path_buf(),
            temp: Some(temp),
            writer: Some(BufWriter::new(file)),
            state: PendingState::Open,
        })
    }

    /// Final path this file publishes to
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path of the temp file while it still exists
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_deref()
    }

    pub fn state(&self) -> PendingState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == PendingState::Open
    }

    fn ensure_open(&self) -> MirrorResult<()> {
        match self.state {
            PendingState::Open => Ok(()),
            PendingState::Completed => {
                error!("Use of completed pending file for {}", self.target.display());
                Err(MirrorError::AlreadyCompleted(self.target.clone()))
            }
            PendingState::Aborted => {
                error!("Use of aborted pending file for {}", self.target.display());
                Err(MirrorError::AlreadyAborted(self.target.clone()))
            }
        }
    }

    fn open_writer(&mut self) -> MirrorResult<&mut BufWriter<File>> {
        self.ensure_open()?;
        let target = &self.target;
        self.writer.as_mut().ok_or_else(|| {
            MirrorError::Internal(format!("open pending file for {} has no writer", target.display()))
        })
    }

    /// Append `data`, returning the number of bytes accepted
    pub fn write(&mut self, data: &[u8]) -> MirrorResult<usize> {
        let writer = self.open_writer()?;
        match write_fully(writer, data) {
            Ok(()) => Ok(data.len()),
            Err(PartialWrite { written, source }) if source.kind() == io::ErrorKind::WriteZero => {
                Err(MirrorError::NoProgress {
                    path: self.target.clone(),
                    written,
                    source,
                })
            }
            Err(PartialWrite { source, .. }) => Err(MirrorError::fs(
                format!("writing mirror file for {}", self.target.display()),
                &self.target,
                source,
            )),
        }
    }

    /// Set an extended attribute on the temp file; it survives the rename
    pub fn set_attribute(&mut self, name: &str, value: &[u8]) -> MirrorResult<()> {
        let writer = self.open_writer()?;
        #[cfg(unix)]
        let result = {
            use xattr::FileExt;
            writer.get_ref().set_xattr(name, value)
        };
        #[cfg(not(unix))]
        let result = {
            let _ = (writer, value);
            Err(io::Error::from(io::ErrorKind::Unsupported))
        };
        result.map_err(|e| {
            MirrorError::fs(
                format!("setting {} on mirror file for {}", name, self.target.display()),
                &self.target,
                e,
            )
        })
    }

    /// Flush, sync and atomically rename the temp file onto the target.
    ///
    /// Completing twice is a no-op. Any failure removes the temp file and
    /// leaves the target as it was.
    pub fn complete(&mut self) -> MirrorResult<()> {
        match self.state {
            PendingState::Completed => return Ok(()),
            PendingState::Aborted => return Err(MirrorError::AlreadyAborted(self.target.clone())),
            PendingState::Open => {}
        }

        // Terminal from here on, whatever publish returns
        self.state = PendingState::Aborted;
        let (Some(writer), Some(temp)) = (self.writer.take(), self.temp.take()) else {
            return Err(MirrorError::Internal(format!(
                "open pending file for {} lost its temp file",
                self.target.display()
            )));
        };

        publish(writer, temp, &self.target)?;
        self.state = PendingState::Completed;
        debug!("Published mirror file {}", self.target.display());
        Ok(())
    }

    /// Discard buffered data and remove the temp file.
    ///
    /// Aborting twice is a no-op.
    pub fn abort(&mut self) -> MirrorResult<()> {
        match self.state {
            PendingState::Aborted => return Ok(()),
            PendingState::Completed => {
                return Err(MirrorError::AlreadyCompleted(self.target.clone()))
            }
            PendingState::Open => {}
        }

        self.state = PendingState::Aborted;
        if let Some(writer) = self.writer.take() {
            let (file, _unflushed) = writer.into_parts();
            drop(file);
        }
        match self.temp.take() {
            Some(temp) => temp.close().map_err(|e| {
                MirrorError::fs(
                    format!("removing temp file for {}", self.target.display()),
                    &self.target,
                    e,
                )
            }),
            None => Ok(()),
        }
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.state != PendingState::Open {
            return;
        }
        match self.abort() {
            Ok(()) => debug!("Discarded unfinished mirror file for {}", self.target.display()),
            Err(source) => Diagnostic::ImplicitAbort {
                path: self.target.clone(),
                source,
            }
            .report(),
        }
    }
}

fn publish(writer: BufWriter<File>, temp: TempPath, target: &Path) -> MirrorResult<()> {
    let file = match writer.into_inner() {
        Ok(file) => file,
        Err(e) => {
            let (source, writer) = e.into_parts();
            drop(writer.into_parts());
            return Err(discard_after("flushing", temp, target, source));
        }
    };

    if let Err(source) = file.sync_all() {
        drop(file);
        return Err(discard_after("syncing", temp, target, source));
    }
    drop(file);

    if let Err(e) = temp.persist(target) {
        return Err(discard_after("renaming", e.path, target, e.error));
    }

    #[cfg(unix)]
    if let Some(dir) = target.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        // Makes the rename itself durable
        if let Err(e) = File::open(dir).and_then(|dir| dir.sync_all()) {
            debug!("Failed to sync directory {}: {}", dir.display(), e);
        }
    }

    Ok(())
}

fn discard_after(step: &str, temp: TempPath, target: &Path, source: io::Error) -> MirrorError {
    let cleanup = temp.close().err();
    MirrorError::fs(
        format!("{} mirror file for {}", step, target.display()),
        target,
        source,
    )
    .with_cleanup(cleanup)
}
