//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// mirrorfs - write-through local mirror for HTTP responses
///
/// Streams GET responses to the client while atomically publishing a
/// byte-identical copy under a local root.
#[derive(Parser, Debug)]
#[command(name = "mirrorfs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MIRRORFS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a path from the upstream through the mirror
    Fetch(FetchArgs),

    /// Show what is mirrored for a path
    Inspect(InspectArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Absolute URL path, e.g. /dists/stable/Release
    pub path: String,

    /// Mirror root directory (overrides mirror.root)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Upstream base URL (overrides upstream.base_url)
    #[arg(short, long, env = "MIRRORFS_UPSTREAM")]
    pub upstream: Option<String>,

    /// Write the ETag to a sidecar file with this suffix
    #[arg(long, value_name = "SUFFIX")]
    pub etag_suffix: Option<String>,

    /// Store the ETag as an extended attribute
    #[arg(long)]
    pub xattr: bool,

    /// Write the body SHA-256 to a sidecar file with this suffix
    #[arg(long, value_name = "SUFFIX")]
    pub sha256_suffix: Option<String>,

    /// Store the body SHA-256 as an extended attribute
    #[arg(long)]
    pub sha256_xattr: bool,

    /// Keep an existing mirror file instead of refreshing it
    #[arg(long)]
    pub keep_existing: bool,

    /// Write the body to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Absolute URL path
    pub path: String,

    /// Mirror root directory (overrides mirror.root)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value, e.g. `mirror.xattr true`
    Set {
        /// Dot-separated key
        key: String,

        /// New value
        value: String,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}
