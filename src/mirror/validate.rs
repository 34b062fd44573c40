//! Classification of whatever already sits at a mirror target

use crate::error::{MirrorError, MirrorResult};
use std::fs::{self, Permissions};
use std::io;
use std::path::Path;

/// What a non-following stat found at a mirror target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEntry {
    /// Nothing there yet
    Absent,
    /// An earlier mirror; its permissions are carried onto the replacement
    Regular { permissions: Permissions },
    /// A directory, never written over
    Directory,
    /// Device, socket, fifo or symlink
    Irregular,
}

impl MirrorEntry {
    /// Short label for CLI output
    pub fn label(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Regular { .. } => "regular",
            Self::Directory => "directory",
            Self::Irregular => "irregular",
        }
    }

    /// Refuse entries a new mirror must not replace.
    ///
    /// Returns the permissions of a prior regular file, if any.
    pub fn ensure_writable(self, path: &Path) -> MirrorResult<Option<Permissions>> {
        match self {
            Self::Absent => Ok(None),
            Self::Regular { permissions } => Ok(Some(permissions)),
            Self::Directory => Err(MirrorError::IsDirectory(path.to_path_buf())),
            Self::Irregular => Err(MirrorError::NotRegular(path.to_path_buf())),
        }
    }
}

/// Stat `path` without following symlinks and classify the result
pub fn classify(path: &Path) -> MirrorResult<MirrorEntry> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MirrorEntry::Absent),
        Err(e) => {
            return Err(MirrorError::fs(
                format!("inspecting mirror target {}", path.display()),
                path,
                e,
            ))
        }
    };

    let file_type = metadata.file_type();
    Ok(if file_type.is_file() {
        MirrorEntry::Regular {
            permissions: metadata.permissions(),
        }
    } else if file_type.is_dir() {
        MirrorEntry::Directory
    } else {
        MirrorEntry::Irregular
    })
}
