//! Fetch command - request a path from the upstream through the mirror

use super::cli_placeholders;
use crate::cli::args::FetchArgs;
use crate::config::{Config, MirrorConfig};
use crate::error::{MirrorError, MirrorResult};
use crate::mirror::{Disposition, Mirror, MirrorOutcome, Placeholders, StreamResponse};
use crate::ui::{self, TransferProgress, UiContext};
use crate::upstream::UpstreamHandler;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};
use tracing::info;
use ureq::http::{Request, StatusCode};

/// Result of one fetch
#[derive(Debug)]
struct Transfer {
    status: Option<StatusCode>,
    disposition: Disposition,
}

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> MirrorResult<()> {
    let ctx = UiContext::detect();
    let mirror = Mirror::new(mirror_config(&args, &config.mirror));

    let mut upstream = config.upstream.clone();
    if let Some(url) = &args.upstream {
        upstream.base_url = url.clone();
    }
    let handler = UpstreamHandler::new(&upstream)?;

    let request = Request::get(args.path.as_str())
        .body(())
        .map_err(|e| MirrorError::User(format!("Invalid path {}: {}", args.path, e)))?;
    info!(url = %handler.url_for(&request), "Fetching");

    let output = args.output.clone();
    let transfer = tokio::task::spawn_blocking(move || {
        transfer(&mirror, &handler, &request, &cli_placeholders(), output, ctx)
    })
    .await
    .map_err(|e| MirrorError::Internal(format!("fetch task failed: {}", e)))??;

    report(&ctx, &transfer);
    Ok(())
}

/// Apply command-line overrides to the configured mirror settings
fn mirror_config(args: &FetchArgs, base: &MirrorConfig) -> MirrorConfig {
    let mut config = base.clone();
    if let Some(root) = &args.root {
        config.root = root.display().to_string();
    }
    if let Some(suffix) = &args.etag_suffix {
        config.etag_file_suffix = suffix.clone();
    }
    if let Some(suffix) = &args.sha256_suffix {
        config.sha256_file_suffix = suffix.clone();
    }
    config.xattr |= args.xattr;
    config.sha256_xattr |= args.sha256_xattr;
    if args.keep_existing {
        config.refresh_existing = false;
    }
    config
}

fn transfer(
    mirror: &Mirror,
    handler: &UpstreamHandler,
    request: &Request<()>,
    placeholders: &Placeholders,
    output: Option<PathBuf>,
    ctx: UiContext,
) -> MirrorResult<Transfer> {
    // An existing output file is only replaced by a complete body
    let mut staged = output.as_deref().map(stage_output).transpose()?;
    let out: Box<dyn Write + '_> = match staged.as_mut() {
        Some(file) => Box::new(file),
        None => Box::new(io::stdout().lock()),
    };
    // Never draw over a body streamed to the terminal
    let progress = match &output {
        Some(path) => TransferProgress::new(&ctx, &path.display().to_string()),
        None => TransferProgress::new(&UiContext::non_interactive(), ""),
    };

    let mut response = StreamResponse::new(BufWriter::new(progress.wrap(out)));
    let served = mirror.serve(request, &mut response, placeholders, handler);
    progress.finish();
    let disposition = served?;

    let status = response.status();
    response
        .into_inner()
        .flush()
        .map_err(|e| MirrorError::io("flushing output", e))?;

    if let (Some(file), Some(path)) = (staged, output.as_deref()) {
        file.persist(path).map_err(|e| {
            MirrorError::fs(format!("replacing {}", path.display()), path, e.error)
        })?;
    }

    Ok(Transfer {
        status,
        disposition,
    })
}

/// Temp file beside `path` that is renamed onto it after a successful fetch
fn stage_output(path: &Path) -> MirrorResult<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = Builder::new();
    builder.prefix(".mirrorfs-output.").suffix(".partial");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder
        .tempfile_in(dir)
        .map_err(|e| MirrorError::fs(format!("creating {}", path.display()), path, e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Ok,
    Info,
    Warn,
    Error,
}

/// One-line summary of what happened to the mirror
fn summarize(transfer: &Transfer) -> (Severity, String) {
    match &transfer.disposition {
        Disposition::Passthrough(skip) => (Severity::Info, format!("Not mirrored: {}", skip)),
        Disposition::Mirrored {
            target,
            outcome: MirrorOutcome::Published,
            bytes_written,
            ..
        } => (
            Severity::Ok,
            format!("Mirrored {} bytes to {}", bytes_written, target.display()),
        ),
        // A 200 body that still did not land on disk
        Disposition::Mirrored {
            target, outcome, ..
        } if transfer.status == Some(StatusCode::OK) => (
            Severity::Error,
            format!("Mirror {} for {}", outcome, target.display()),
        ),
        Disposition::Mirrored {
            target, outcome, ..
        } => (
            Severity::Warn,
            format!("Mirror {} for {}", outcome, target.display()),
        ),
    }
}

fn report(ctx: &UiContext, transfer: &Transfer) {
    match transfer.status {
        Some(StatusCode::OK) => {}
        Some(status) => ui::step_warn(ctx, &format!("Upstream answered {}", status)),
        None => ui::step_warn(ctx, "Upstream sent no response"),
    }

    let (severity, line) = summarize(transfer);
    match severity {
        Severity::Ok => ui::step_ok(ctx, &line),
        Severity::Info => ui::step_info(ctx, &line),
        Severity::Warn => ui::step_warn(ctx, &line),
        Severity::Error => ui::step_error(ctx, &line),
    }

    if let Disposition::Mirrored { diagnostics, .. } = &transfer.disposition {
        if *diagnostics > 0 {
            ui::remark(
                ctx,
                &format!("{} metadata problem(s), rerun with -v for details", diagnostics),
            );
        }
    }
}
