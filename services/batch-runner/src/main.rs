//! Batch Runner
//!
//! Single-binary job that:
//! 1. Discovers `block*.txt` text blocks in an input directory
//! 2. Sends each block to an HTTP generation endpoint under a global rate limit
//! 3. Rotates to the next API key when the active one runs out of quota
//! 4. Writes artifacts to the output directory and archives processed blocks
//!
//! Exits non-zero when any block was dropped or left unprocessed.

mod blocks;
mod config;
mod error;
mod http_generator;
mod metrics;
mod natural;

use std::sync::Arc;

use anyhow::{Context, Result};
use pipeline::{JobTracker, Pipeline, RunReport};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::http_generator::HttpGenerator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting batch-runner");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        endpoint_url = %config.generator.endpoint_url,
        input_dir = %config.input.dir.display(),
        output_dir = %config.input.output_dir.display(),
        keys = config.credentials.keys.len(),
        "configuration loaded"
    );

    let report = run(&config).await?;

    if let Some(ref path) = config.metrics.snapshot_path {
        match metrics::write_snapshot(&prometheus_handle, path) {
            Ok(()) => info!(path = %path.display(), "metrics snapshot written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write metrics snapshot"),
        }
    }

    if let Some(report) = report {
        verdict(&report)?;
    }
    Ok(())
}

/// Discover blocks and push them through the pipeline.
///
/// Returns `None` when there was nothing to do.
async fn run(config: &Config) -> Result<Option<RunReport>> {
    let paths = blocks::discover(&config.input.dir, &config.input.prefix)
        .context("failed to scan input directory")?;
    if paths.is_empty() {
        warn!(
            dir = %config.input.dir.display(),
            prefix = %config.input.prefix,
            "no blocks found, nothing to do"
        );
        return Ok(None);
    }
    info!(blocks = paths.len(), "blocks discovered");

    std::fs::create_dir_all(&config.input.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.input.output_dir.display()
        )
    })?;
    let units = blocks::load_units(&paths, &config.input.output_dir, &config.input.extension)
        .context("failed to read blocks")?;

    let generator = HttpGenerator::new(build_client()?, config.generator.endpoint_url.clone())
        .with_instruction(config.generator.instruction.clone())
        .with_done_dir(config.input.done_dir.clone());

    let tracker = Arc::new(JobTracker::new());
    let job = tracker.handle(&tracker.create());

    let mut pipeline = Pipeline::from_keys(
        config.credentials.keys.clone(),
        Arc::new(generator),
        Arc::new(job.clone()),
    )?;
    pipeline.submit(units).await;
    let credential_pool = Arc::clone(pipeline.pool());

    let report = pipeline.run(&config.pipeline_config()).await?;

    if let Some(state) = job.state() {
        info!(
            job_id = %job.job_id(),
            status = state.status.label(),
            progress = state.progress,
            message = %state.message,
            "job finished"
        );
    }
    info!(pool = %credential_pool.health().await, "credential pool at end of run");

    Ok(Some(report))
}

fn build_client() -> error::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("batch-runner/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Fail the process when the run left anything behind.
fn verdict(report: &RunReport) -> error::Result<()> {
    if report.is_complete() && report.dropped.is_empty() {
        info!(
            completed = report.completed.len(),
            skipped_empty = report.skipped_empty.len(),
            "all blocks processed"
        );
        return Ok(());
    }
    for dropped in &report.dropped {
        warn!(unit = %dropped.id, error = %dropped.error, "block dropped");
    }
    Err(error::Error::Incomplete {
        unprocessed: report.still_queued.len(),
        dropped: report.dropped.len(),
    })
}
