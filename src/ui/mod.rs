//! Terminal output for the mirrorfs CLI
//!
//! Status lines go to stderr so that `fetch` can stream a body on stdout;
//! only result listings such as `inspect` print to stdout.
//! Styling and progress bars are only used when stderr is a terminal
//! outside CI; otherwise everything degrades to tagged plain lines.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, key_value_status, remark, section, step_error, step_info, step_ok, step_warn};
pub use progress::TransferProgress;
