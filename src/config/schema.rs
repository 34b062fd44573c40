//! Configuration schema for mirrorfs
//!
//! Configuration is stored at `~/.config/mirrorfs/config.toml`

use serde::{Deserialize, Serialize};

/// Placeholder the host pipeline resolves to the site root
pub const DEFAULT_ROOT: &str = "{http.vars.root}";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Mirror behavior
    pub mirror: MirrorConfig,

    /// Upstream used by `mirrorfs fetch`
    pub upstream: UpstreamConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Settings consumed by the mirror handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Root directory template; placeholders are resolved per request
    pub root: String,

    /// Suffix of the ETag sidecar file, empty to disable
    pub etag_file_suffix: String,

    /// Store the ETag as the `user.xdg.origin.etag` extended attribute
    pub xattr: bool,

    /// Store the body SHA-256 as the `user.xdg.origin.sha256` extended attribute
    pub sha256_xattr: bool,

    /// Suffix of the SHA-256 sidecar file, empty to disable
    pub sha256_file_suffix: String,

    /// Re-create a mirror that already exists as a regular file
    pub refresh_existing: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            etag_file_suffix: String::new(),
            xattr: false,
            sha256_xattr: false,
            sha256_file_suffix: String::new(),
            refresh_existing: true,
        }
    }
}

impl MirrorConfig {
    /// Whether bodies are hashed at all
    pub fn content_digest(&self) -> bool {
        self.sha256_xattr || !self.sha256_file_suffix.is_empty()
    }
}

/// Upstream HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL request paths are appended to
    pub base_url: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 30,
        }
    }
}
