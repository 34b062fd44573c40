//! Completions command - print a shell completion script

use crate::cli::args::{Cli, CompletionsArgs};
use clap::CommandFactory;
use clap_complete::generate;

/// Execute the completions command
pub fn execute(args: CompletionsArgs) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    generate(args.shell, &mut command, name, &mut std::io::stdout());
}
