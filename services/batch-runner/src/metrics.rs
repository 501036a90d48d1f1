//! Prometheus metrics exposition
//!
//! A batch run has no scrape endpoint, so the rendered exposition text is
//! written to a file when the run ends, for a node-exporter textfile
//! collector to pick up. Metric names are defined where they are recorded:
//!
//! - `pipeline_tasks_total` (counter): label `outcome`
//! - `pipeline_generate_duration_seconds` (histogram): label `result`
//! - `pipeline_rate_limit_waits_total`, `pipeline_rate_limit_wait_millis_total` (counters)
//! - `credential_pool_rotations_total` (counter), `credential_pool_active_index` (gauge)

use std::path::Path;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Generation calls range from sub-second text to multi-minute audio.
const GENERATE_BUCKETS: &[f64] = &[
    0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("pipeline_generate_duration_seconds".to_string()),
        GENERATE_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `pipeline_generate_duration_seconds` gets explicit buckets so it renders
/// as a histogram with `_bucket` lines rather than a summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Render current metrics and write them to `path`.
///
/// Writes to a sibling temp file first and renames it into place so a
/// collector never reads a half-written file.
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, handle.render())?;
    std::fs::rename(&tmp, path)
}
