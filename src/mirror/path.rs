//! Mapping request paths onto the mirror root

use crate::error::{MirrorError, MirrorResult};
use percent_encoding::percent_decode_str;
use std::path::PathBuf;

/// Whether the request targets a directory listing rather than a file
pub fn is_directory_request(url_path: &str) -> bool {
    url_path.ends_with('/')
}

/// Resolve `url_path` to a local path inside `root`.
///
/// The path is percent-decoded and cleaned lexically, so `..` segments can
/// never climb above `root`. An empty root means the current directory.
pub fn resolve(root: &str, url_path: &str) -> MirrorResult<PathBuf> {
    if !url_path.starts_with('/') {
        return Err(MirrorError::InvalidRequest(url_path.to_string()));
    }

    let decoded = percent_decode_str(url_path).decode_utf8_lossy();

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut path = PathBuf::from(if root.is_empty() { "." } else { root });
    for segment in segments {
        // A decoded separator or NUL would escape the segment boundary
        if segment.contains(['\\', '\0']) {
            return Err(MirrorError::InvalidRequest(url_path.to_string()));
        }
        path.push(segment);
    }
    Ok(path)
}
