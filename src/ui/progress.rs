//! Transfer progress with CI fallback

use super::context::UiContext;
use indicatif::{ProgressBar, ProgressBarIter, ProgressStyle};
use std::io::Write;
use std::time::Duration;

const TEMPLATE: &str =
    "  {spinner:.cyan} {prefix}  {bytes:.bold} {binary_bytes_per_sec:.dim}  {elapsed:.dim}";

/// Byte counter for a body being written to a file.
///
/// Hidden unless the context is interactive.
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template(TEMPLATE) {
                bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    /// Count every byte written through `out`
    pub fn wrap<W: Write>(&self, out: W) -> ProgressBarIter<W> {
        self.bar.wrap_write(out)
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }
}
