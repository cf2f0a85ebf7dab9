//! Build configuration.
//!
//! Defaults are suitable for library use; `BuildConfig::from_env` lets a
//! hosting service tune the build without code changes.

use std::num::NonZeroUsize;

/// Environment variable overriding the extraction worker count.
pub const WORKERS_ENV: &str = "CPGFORGE_WORKERS";

/// Environment variable adding directory names to the walk exclusion set
/// (comma separated).
pub const EXCLUDE_DIRS_ENV: &str = "CPGFORGE_EXCLUDE_DIRS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfig {
    /// Size of the extraction worker pool.
    pub workers: usize,
    /// Directory names pruned in addition to the fixed exclusion set.
    pub extra_excluded_dirs: Vec<String>,
    pub follow_links: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            extra_excluded_dirs: Vec::new(),
            follow_links: false,
        }
    }
}

impl BuildConfig {
    /// Defaults overridden by `CPGFORGE_WORKERS` and `CPGFORGE_EXCLUDE_DIRS`.
    /// Unparsable or zero worker counts fall back to the default.
    pub fn from_env() -> Self {
        let workers = std::env::var(WORKERS_ENV).ok();
        let excluded = std::env::var(EXCLUDE_DIRS_ENV).ok();
        Self::from_values(workers.as_deref(), excluded.as_deref())
    }

    fn from_values(workers: Option<&str>, excluded: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(n) = workers.and_then(|raw| raw.trim().parse::<usize>().ok()) {
            if n > 0 {
                config.workers = n;
            }
        }
        if let Some(raw) = excluded {
            config.extra_excluded_dirs = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        config
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
