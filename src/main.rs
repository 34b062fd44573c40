//! mirrorfs CLI entry point

use clap::Parser;
use console::style;
use mirrorfs::cli::args::{ConfigAction, ConfigArgs};
use mirrorfs::cli::{Cli, Commands};
use mirrorfs::config::{Config, ConfigManager};
use mirrorfs::error::MirrorResult;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> MirrorResult<()> {
    let cli = Cli::parse();

    // Completions need neither logging nor config
    if let Commands::Completions(args) = cli.command {
        mirrorfs::cli::commands::completions(args);
        return Ok(());
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("mirrorfs=warn"),
        1 => EnvFilter::new("mirrorfs=info"),
        _ => EnvFilter::new("mirrorfs=debug"),
    };
    let json = matches!(&config, Ok(config) if config.general.log_format == "json");

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    let config = match config {
        Ok(config) => config,
        // A broken file must not block rewriting it
        Err(e) if is_config_init(&cli.command) => {
            warn!("{}", e);
            Config::default()
        }
        Err(e) => return Err(e),
    };

    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Fetch(args) => mirrorfs::cli::commands::fetch(args, &config).await,
        Commands::Inspect(args) => mirrorfs::cli::commands::inspect(args, &config).await,
        Commands::Config(args) => {
            mirrorfs::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

fn is_config_init(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Config(ConfigArgs {
            action: Some(ConfigAction::Init { .. })
        })
    )
}
