//! Engine configuration: defaults, JSON loading, env overrides and validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::logging::{ErrorCategory, log_warning_simple};

/// Default extractor program, resolved on `PATH`.
pub const DEFAULT_TOOL_PATH: &str = "yt-dlp";

/// Bounded probe queue capacity.
pub const DEFAULT_PROBE_QUEUE_CAPACITY: usize = 64;

pub const DEFAULT_PREFETCH_FIRST_BATCH: usize = 30;
pub const DEFAULT_PREFETCH_FIRST_DELAY_MS: u64 = 120;
pub const DEFAULT_PREFETCH_REST_DELAY_MS: u64 = 350;

pub const ENV_TOOL_PATH: &str = "GRABX_YTDLP_PATH";
pub const ENV_PROBE_WORKERS: &str = "GRABX_PROBE_WORKERS";
pub const ENV_LOG_DIR: &str = "GRABX_LOG_DIR";

/// Upper bound for a user-supplied worker count. Each worker owns one
/// extractor process at a time.
const MAX_PROBE_WORKERS: usize = 8;

/// Worker pool size: half the available cores, clamped to `1..=2`.
pub fn default_probe_workers() -> usize {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cores / 2).clamp(1, 2)
}

fn default_tool_path() -> PathBuf {
    PathBuf::from(DEFAULT_TOOL_PATH)
}

fn default_probe_queue_capacity() -> usize {
    DEFAULT_PROBE_QUEUE_CAPACITY
}

fn default_prefetch_first_batch() -> usize {
    DEFAULT_PREFETCH_FIRST_BATCH
}

fn default_prefetch_first_delay_ms() -> u64 {
    DEFAULT_PREFETCH_FIRST_DELAY_MS
}

fn default_prefetch_rest_delay_ms() -> u64 {
    DEFAULT_PREFETCH_REST_DELAY_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_tool_path")]
    pub tool_path: PathBuf,
    #[serde(default = "default_probe_workers")]
    pub probe_workers: usize,
    #[serde(default = "default_probe_queue_capacity")]
    pub probe_queue_capacity: usize,
    #[serde(default = "default_prefetch_first_batch")]
    pub prefetch_first_batch: usize,
    #[serde(default = "default_prefetch_first_delay_ms")]
    pub prefetch_first_delay_ms: u64,
    #[serde(default = "default_prefetch_rest_delay_ms")]
    pub prefetch_rest_delay_ms: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            probe_workers: default_probe_workers(),
            probe_queue_capacity: DEFAULT_PROBE_QUEUE_CAPACITY,
            prefetch_first_batch: DEFAULT_PREFETCH_FIRST_BATCH,
            prefetch_first_delay_ms: DEFAULT_PREFETCH_FIRST_DELAY_MS,
            prefetch_rest_delay_ms: DEFAULT_PREFETCH_REST_DELAY_MS,
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::invalid_config(format!("Invalid config JSON: {}", e)))
            .inspect_err(log_rejected)?;
        config.validate().inspect_err(log_rejected)?;
        Ok(config)
    }

    /// Apply `GRABX_*` environment overrides on top of the current values.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok()).inspect_err(log_rejected)
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup(ENV_TOOL_PATH).filter(|s| !s.trim().is_empty()) {
            self.tool_path = PathBuf::from(path.trim());
        }

        if let Some(workers) = lookup(ENV_PROBE_WORKERS) {
            self.probe_workers = workers
                .trim()
                .parse()
                .map_err(|_| EngineError::invalid_config(format!("Invalid {}: {}", ENV_PROBE_WORKERS, workers)))?;
        }

        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|s| !s.trim().is_empty()) {
            self.log_dir = Some(PathBuf::from(dir.trim()));
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tool_path.as_os_str().is_empty() {
            return Err(EngineError::invalid_config("toolPath cannot be empty"));
        }

        if self.probe_workers == 0 || self.probe_workers > MAX_PROBE_WORKERS {
            return Err(EngineError::invalid_config(format!(
                "probeWorkers must be between 1 and {} (got {})",
                MAX_PROBE_WORKERS, self.probe_workers
            )));
        }

        if self.probe_queue_capacity == 0 {
            return Err(EngineError::invalid_config("probeQueueCapacity must be at least 1"));
        }

        Ok(())
    }
}

fn log_rejected(err: &EngineError) {
    log_warning_simple(ErrorCategory::Config, &format!("Configuration rejected: {}", err));
}
