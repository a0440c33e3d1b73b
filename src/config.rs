//! Archiver configuration.
//!
//! Values arrive already validated from the embedding application; this
//! module only carries them and supplies the defaults the rest of the crate
//! is tuned for.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default number of worker tabs.
const DEFAULT_POOL_SIZE: usize = 8;

/// Default idle window before the crawl counts as exhausted.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default throttle base between jobs on one worker tab.
const DEFAULT_WORKER_DELAY: Duration = Duration::from_secs(30);

/// Default per-page quiescence window.
const DEFAULT_LOAD_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// ArchiveConfig
// ============================================================================

/// Configuration for one archive run.
///
/// # Example
///
/// ```ignore
/// use blogvault::ArchiveConfig;
///
/// let config = ArchiveConfig::new("./archive")
///     .with_pool_size(4)
///     .with_max_posts(200);
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Root directory artifacts are saved under.
    pub save_root: PathBuf,

    /// Number of worker tabs downloading posts concurrently.
    pub pool_size: usize,

    /// Maximum number of posts to archive in one run.
    pub max_posts: usize,

    /// Cutoff: posts older than this are treated as already archived.
    pub since: Option<DateTime<Utc>>,

    /// Idle window after which the crawl counts as exhausted.
    pub idle_timeout: Duration,

    /// Throttle base between jobs on one worker tab.
    pub worker_delay: Duration,

    /// Per-page quiescence window.
    pub load_wait: Duration,
}

// ============================================================================
// Constructors
// ============================================================================

impl ArchiveConfig {
    /// Creates a configuration with defaults, saving under `save_root`.
    #[must_use]
    pub fn new(save_root: impl Into<PathBuf>) -> Self {
        Self {
            save_root: save_root.into(),
            pool_size: DEFAULT_POOL_SIZE,
            max_posts: usize::MAX,
            since: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            worker_delay: DEFAULT_WORKER_DELAY,
            load_wait: DEFAULT_LOAD_WAIT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ArchiveConfig {
    /// Sets the number of worker tabs.
    #[inline]
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the maximum number of posts to archive.
    #[inline]
    #[must_use]
    pub fn with_max_posts(mut self, max_posts: usize) -> Self {
        self.max_posts = max_posts;
        self
    }

    /// Sets the cutoff timestamp.
    #[inline]
    #[must_use]
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the idle window.
    #[inline]
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets the per-tab throttle base.
    #[inline]
    #[must_use]
    pub fn with_worker_delay(mut self, worker_delay: Duration) -> Self {
        self.worker_delay = worker_delay;
        self
    }

    /// Sets the per-page quiescence window.
    #[inline]
    #[must_use]
    pub fn with_load_wait(mut self, load_wait: Duration) -> Self {
        self.load_wait = load_wait;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ArchiveConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a value cannot work at all.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::config("pool size must be at least 1"));
        }
        if self.max_posts == 0 {
            return Err(Error::config("max posts must be at least 1"));
        }
        if self.save_root.as_os_str().is_empty() {
            return Err(Error::config("save root must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
