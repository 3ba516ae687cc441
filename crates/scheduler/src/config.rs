//! Scheduler configuration.
//!
//! A builder-with-`Default`: `with_*` methods return `Self`, and the values
//! that have an environment-derived fallback expose an `effective_*`
//! accessor instead of defaulting eagerly. `SYKLI_CONCURRENCY`/
//! `SYKLI_CACHE_DIR`/`SYKLI_TARGET` are read once at the CLI layer and
//! folded in through these builders — this crate never reads the
//! environment itself, so it stays testable as a library.

use std::path::PathBuf;
use std::time::Duration;

/// Exponential backoff cap for task retries (§4.7 step 7: "bounded at
/// 30 s").
pub const DEFAULT_RETRY_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Default number of runs retained per pipeline (§4.8).
pub const DEFAULT_RETAIN_RUNS: usize = 50;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    workspace_root: PathBuf,
    concurrency: Option<usize>,
    cache_dir: Option<PathBuf>,
    history_dir: Option<PathBuf>,
    default_target: Option<String>,
    retain_runs: usize,
    retry_backoff_cap: Duration,
}

impl SchedulerConfig {
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            concurrency: None,
            cache_dir: None,
            history_dir: None,
            default_target: None,
            retain_runs: DEFAULT_RETAIN_RUNS,
            retry_backoff_cap: DEFAULT_RETRY_BACKOFF_CAP,
        }
    }

    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_history_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.history_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_default_target(mut self, name: impl Into<String>) -> Self {
        self.default_target = Some(name.into());
        self
    }

    #[must_use]
    pub const fn with_retain_runs(mut self, retain_runs: usize) -> Self {
        self.retain_runs = retain_runs;
        self
    }

    #[must_use]
    pub const fn with_retry_backoff_cap(mut self, cap: Duration) -> Self {
        self.retry_backoff_cap = cap;
        self
    }

    #[must_use]
    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }

    #[must_use]
    pub fn default_target(&self) -> Option<&str> {
        self.default_target.as_deref()
    }

    /// Falls back to hardware parallelism when no explicit bound was set.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(1)
        })
    }

    #[must_use]
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| self.workspace_root.join(".sykli").join("cache"))
    }

    #[must_use]
    pub fn effective_history_dir(&self) -> PathBuf {
        self.history_dir.clone().unwrap_or_else(|| self.workspace_root.join(".sykli").join("runs"))
    }

    #[must_use]
    pub const fn retain_runs(&self) -> usize {
        self.retain_runs
    }

    #[must_use]
    pub const fn retry_backoff_cap(&self) -> Duration {
        self.retry_backoff_cap
    }
}
