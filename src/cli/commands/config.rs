//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{MirrorError, MirrorResult};
use crate::ui::{self, UiContext};

const VALID_KEYS: [&str; 9] = [
    "general.log_format",
    "mirror.root",
    "mirror.etag_file_suffix",
    "mirror.xattr",
    "mirror.sha256_xattr",
    "mirror.sha256_file_suffix",
    "mirror.refresh_existing",
    "upstream.base_url",
    "upstream.timeout_secs",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> MirrorResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut config = config.clone();
            set_value(&mut config, &key, &value)?;
            manager.save(&config).await?;
            ui::step_ok(&UiContext::detect(), &format!("Set {} = {}", key, value));
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> MirrorResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> MirrorResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn(&ctx, &format!("Config already exists at {}", path.display()));
        ui::remark(&ctx, "Use --force to overwrite");
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok(&ctx, &format!("Configuration initialized at {}", path.display()));
    Ok(())
}

/// Apply one dot-separated `key = value` to `config`
fn set_value(config: &mut Config, key: &str, value: &str) -> MirrorResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => {
                return Err(MirrorError::User(format!(
                    "Invalid log format: {}. Use text or json",
                    value
                )))
            }
        },

        ["mirror", "root"] => config.mirror.root = value.to_string(),
        ["mirror", "etag_file_suffix"] => config.mirror.etag_file_suffix = value.to_string(),
        ["mirror", "xattr"] => config.mirror.xattr = parse_bool(value)?,
        ["mirror", "sha256_xattr"] => config.mirror.sha256_xattr = parse_bool(value)?,
        ["mirror", "sha256_file_suffix"] => config.mirror.sha256_file_suffix = value.to_string(),
        ["mirror", "refresh_existing"] => config.mirror.refresh_existing = parse_bool(value)?,

        ["upstream", "base_url"] => config.upstream.base_url = value.to_string(),
        ["upstream", "timeout_secs"] => {
            config.upstream.timeout_secs = value
                .parse()
                .map_err(|_| MirrorError::User(format!("Invalid number: {}", value)))?
        }

        _ => {
            return Err(MirrorError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> MirrorResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(MirrorError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}
