//! CLI command implementations

pub mod completions;
pub mod config;
pub mod fetch;
pub mod inspect;

pub use completions::execute as completions;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use inspect::execute as inspect;

use crate::mirror::Placeholders;

/// Placeholders available to `mirror.root` outside a server pipeline
pub(crate) fn cli_placeholders() -> Placeholders {
    Placeholders::from_env().with("http.vars.root", ".")
}
