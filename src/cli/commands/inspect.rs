//! Inspect command - show what is mirrored for a path

use super::cli_placeholders;
use crate::cli::args::InspectArgs;
use crate::config::{Config, MirrorConfig};
use crate::error::{MirrorError, MirrorResult};
use crate::mirror::validate::{self, MirrorEntry};
use crate::mirror::{path, Replacer, SidecarRecord};
use crate::ui::{self, UiContext};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// Everything known about one mirror target
#[derive(Debug, Serialize)]
struct Inspection {
    path: String,
    target: PathBuf,
    kind: &'static str,
    size: Option<u64>,
    #[serde(flatten)]
    metadata: SidecarRecord,
}

/// Execute the inspect command
pub async fn execute(args: InspectArgs, config: &Config) -> MirrorResult<()> {
    let mut mirror = config.mirror.clone();
    if let Some(root) = &args.root {
        mirror.root = root.display().to_string();
    }

    let inspection = inspect(&args.path, &mirror)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        print_inspection(&UiContext::detect(), &inspection);
    }
    Ok(())
}

fn inspect(url_path: &str, config: &MirrorConfig) -> MirrorResult<Inspection> {
    let root = cli_placeholders().replace_all(&config.root, ".");
    let target = path::resolve(&root, url_path)?;
    let entry = validate::classify(&target)?;

    let (size, metadata) = match entry {
        MirrorEntry::Regular { .. } => {
            let size = fs::metadata(&target)
                .map_err(|e| MirrorError::fs("reading mirror metadata", &target, e))?
                .len();
            let metadata = SidecarRecord::load(&target, config)
                .map_err(|e| MirrorError::fs("reading mirror sidecars", &target, e))?;
            (Some(size), metadata)
        }
        _ => (None, SidecarRecord::default()),
    };

    Ok(Inspection {
        path: url_path.to_string(),
        target,
        kind: entry.label(),
        size,
        metadata,
    })
}

fn print_inspection(ctx: &UiContext, inspection: &Inspection) {
    ui::section(ctx, &inspection.path);
    ui::key_value(ctx, "target", &inspection.target.display().to_string());
    ui::key_value_status(ctx, "kind", inspection.kind, inspection.kind == "regular");
    if let Some(size) = inspection.size {
        ui::key_value(ctx, "size", &format!("{} bytes", size));
    }

    let fields = [
        ("etag", &inspection.metadata.etag),
        ("sha256", &inspection.metadata.sha256),
        ("etag xattr", &inspection.metadata.etag_attribute),
        ("sha256 xattr", &inspection.metadata.sha256_attribute),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            ui::key_value(ctx, key, value);
        }
    }
}
