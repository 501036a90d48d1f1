//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! Credentials never live in the TOML. They come from environment variables
//! named `<env_prefix>*` or from a `credentials_file`, one per line.

use common::Secret;
use pipeline::{PipelineConfig, RateLimit};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::natural;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    pub generator: GeneratorSection,
    pub input: InputSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// Worker and permit counts
#[derive(Debug, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Defaults to `workers`
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
}

/// Global sliding-window admission limit
#[derive(Debug, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

/// Remote generation endpoint
#[derive(Debug, Deserialize)]
pub struct GeneratorSection {
    pub endpoint_url: String,
    /// Sent with every request, e.g. a voice or style hint
    #[serde(default)]
    pub instruction: Option<String>,
}

/// Where blocks are read from and artifacts written to
#[derive(Debug, Deserialize)]
pub struct InputSection {
    pub dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    pub output_dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Processed blocks are moved here when set
    #[serde(default)]
    pub done_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsSection {
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    #[serde(skip)]
    pub keys: Vec<Secret<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsSection {
    /// Write the Prometheus exposition text here when the run ends
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            concurrency: None,
            call_timeout_secs: None,
        }
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            env_prefix: default_env_prefix(),
            credentials_file: None,
            keys: Vec::new(),
        }
    }
}

fn default_workers() -> usize {
    3
}

fn default_limit() -> usize {
    3
}

fn default_window_secs() -> u64 {
    60
}

fn default_prefix() -> String {
    "block".into()
}

fn default_extension() -> String {
    "wav".into()
}

fn default_env_prefix() -> String {
    "GEMINI_API_KEY".into()
}

impl Config {
    /// Load configuration from a TOML file, overlay environment variables,
    /// validate, then resolve credentials.
    ///
    /// Credential resolution order:
    /// 1. `<env_prefix>*` env vars, in natural order of the variable name
    /// 2. `credentials_file` from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Some(workers) = env_number("MAX_CONCURRENT_REQUESTS")? {
            config.pipeline.workers = workers;
            config.pipeline.concurrency = Some(workers);
        }
        if let Some(limit) = env_number("API_REQUEST_LIMIT")? {
            config.rate_limit.limit = limit;
        }
        if let Some(window) = env_number("API_REQUEST_WINDOW_SECONDS")? {
            config.rate_limit.window_secs = window as u64;
        }

        config.validate()?;
        config.credentials.keys = config.credentials.resolve()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.generator.endpoint_url.starts_with("http://")
            && !self.generator.endpoint_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "endpoint_url must start with http:// or https://, got: {}",
                self.generator.endpoint_url
            )));
        }

        if self.pipeline.workers == 0 {
            return Err(common::Error::Config(
                "workers must be greater than 0".into(),
            ));
        }
        if self.pipeline.concurrency == Some(0) {
            return Err(common::Error::Config(
                "concurrency must be greater than 0".into(),
            ));
        }
        if self.pipeline.call_timeout_secs == Some(0) {
            return Err(common::Error::Config(
                "call_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.rate_limit.limit == 0 {
            return Err(common::Error::Config(
                "rate_limit.limit must be greater than 0".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(common::Error::Config(
                "rate_limit.window_secs must be greater than 0".into(),
            ));
        }
        if self.input.extension.is_empty() || self.input.extension.contains('/') {
            return Err(common::Error::Config(format!(
                "extension must be a bare file extension, got: {:?}",
                self.input.extension
            )));
        }
        Ok(())
    }

    /// Pipeline tuning derived from the `[pipeline]` and `[rate_limit]` sections.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            workers: self.pipeline.workers,
            concurrency: self.pipeline.concurrency.unwrap_or(self.pipeline.workers),
            rate_limit: RateLimit {
                limit: self.rate_limit.limit,
                window: Duration::from_secs(self.rate_limit.window_secs),
            },
            call_timeout: self.pipeline.call_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("batch-runner.toml")
    }
}

impl CredentialsSection {
    fn resolve(&self) -> common::Result<Vec<Secret<String>>> {
        let from_env = env_credentials(&self.env_prefix);
        if !from_env.is_empty() {
            return Ok(from_env);
        }

        if let Some(ref file) = self.credentials_file {
            let contents = std::fs::read_to_string(file).map_err(|e| {
                common::Error::Credentials(format!(
                    "failed to read credentials_file {}: {e}",
                    file.display()
                ))
            })?;
            let keys: Vec<Secret<String>> = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|line| Secret::new(line.to_owned()))
                .collect();
            if !keys.is_empty() {
                return Ok(keys);
            }
        }

        Err(common::Error::Credentials(format!(
            "no credentials found; set {}* or credentials_file",
            self.env_prefix
        )))
    }
}

/// Non-blank values of `<prefix>*` env vars, ordered by variable name.
fn env_credentials(prefix: &str) -> Vec<Secret<String>> {
    let mut vars: Vec<(String, String)> = std::env::vars()
        .filter(|(name, value)| name.starts_with(prefix) && !value.trim().is_empty())
        .collect();
    vars.sort_by(|a, b| natural::compare(&a.0, &b.0));
    vars.into_iter()
        .map(|(_, value)| Secret::new(value.trim().to_owned()))
        .collect()
}

fn env_number(name: &str) -> common::Result<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            common::Error::Config(format!("{name} must be a non-negative integer, got: {raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}
