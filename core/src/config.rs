use std::path::PathBuf;

/// Session-wide limits and locations.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where compiled modules are persisted. `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    /// Maximum nesting of instance search.
    pub instance_depth: usize,
    /// Reduction steps allowed per normalization call.
    pub reduction_fuel: usize,
    /// Maximum nesting of conversion checks.
    pub conversion_depth: usize,
    /// Worker threads for independent modules, `0` for the rayon default.
    pub jobs: usize,
    /// Stack size of each worker thread in bytes. Deep terms grow the
    /// stack further on demand.
    pub worker_stack: usize,
    /// Load the prelude from the cache when an entry is present.
    pub use_prelude_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            instance_depth: 8,
            reduction_fuel: 1_000_000,
            conversion_depth: 512,
            jobs: 0,
            worker_stack: 8 * 1024 * 1024,
            use_prelude_cache: true,
        }
    }
}

impl Config {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }
}
