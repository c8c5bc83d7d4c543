pub mod apply;
pub mod destroy;
pub mod status;

use crate::Context;
use crate::config::WpsyncConfig;
use crate::paths;
use crate::state::SyncState;
use crate::ui;
use anyhow::{Result, bail};
use waypointkit::{Client, ExecuteOptions, HttpBackend, PassReport, ReconcileOptions};

/// Load the config file and the recorded state.
pub fn load(ctx: &Context) -> Result<(WpsyncConfig, SyncState)> {
    let path = paths::config_file(ctx.config.as_deref())?;
    let config = WpsyncConfig::load(&path)?;
    let state = SyncState::load()?;
    Ok((config, state))
}

/// Like [`load`], but a missing config file yields an empty config so that
/// everything recorded is treated as no longer declared.
pub fn load_lenient(ctx: &Context) -> Result<(WpsyncConfig, SyncState)> {
    let path = paths::config_file(ctx.config.as_deref())?;
    let config = if path.exists() {
        WpsyncConfig::load(&path)?
    } else {
        log::warn!("{} not found; using recorded state only", path.display());
        WpsyncConfig::default()
    };
    let state = SyncState::load()?;
    Ok((config, state))
}

/// Build an API client from the config, preferring the token from the CLI/env.
pub fn client(ctx: &Context, config: &WpsyncConfig) -> Client {
    let mut backend = match &config.api_base {
        Some(base) => HttpBackend::with_api_base(base),
        None => HttpBackend::new(),
    };
    if let Some(token) = ctx.token.as_ref().or(config.token.as_ref()) {
        backend = backend.with_token(token);
    } else {
        log::warn!("no API token configured; requests will be unauthenticated");
    }
    Client::new(backend).with_retry(config.retry.clone())
}

pub fn options(config: &WpsyncConfig, jobs: Option<usize>, dry_run: bool, correct_drift: bool) -> ExecuteOptions {
    ExecuteOptions {
        jobs: jobs.or(config.jobs).unwrap_or(4).max(1),
        dry_run,
        reconcile: ReconcileOptions {
            correct_drift: correct_drift || config.correct_drift,
            patience: config.patience.clone(),
            ..Default::default()
        },
    }
}

/// Print every resource and the summary; fail if anything failed.
pub fn report(ctx: &Context, report: &PassReport) -> Result<()> {
    for resource in &report.resources {
        if !ctx.quiet || !resource.result.is_success() {
            ui::resource(resource);
        }
    }
    ui::summary(&report.summary);

    if report.summary.is_success() {
        return Ok(());
    }
    println!();
    ui::advice(report.failures().filter_map(|r| match &r.result {
        waypointkit::ApplyResult::Failed { category, .. } => Some(category),
        _ => None,
    }));
    bail!("{} resource(s) failed", report.summary.failed)
}
