use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Scheduler-wide configuration.
///
/// # Examples
///
/// ```
/// use mediaload::DownloaderConfig;
///
/// let config = DownloaderConfig::default()
///     .part_size(64 * 1024)
///     .storage_queue_limit(8);
/// assert_eq!(config.part_size, 64 * 1024);
///
/// let parsed = DownloaderConfig::from_toml_str("web_queue_limit = 2").unwrap();
/// assert_eq!(parsed.web_queue_limit, 2);
/// assert_eq!(parsed.part_size, 128 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Length of every remote-storage chunk request.
    ///
    /// A response shorter than this marks the end of the content.
    ///
    /// Default: 128 KiB
    pub part_size: u32,

    /// Outstanding chunk requests allowed per data center.
    ///
    /// Default: 16
    pub storage_queue_limit: usize,

    /// Web fetches allowed to run at the same time.
    ///
    /// Default: 8
    pub web_queue_limit: usize,

    /// Sub-connections per data center that chunk requests are spread over.
    ///
    /// Default: 4
    pub sessions_per_dc: usize,

    /// Redirects a web fetch may follow before it fails.
    ///
    /// Default: 5
    pub max_redirects: u32,

    /// Largest payload mirrored into the local cache.
    ///
    /// Default: 10 MiB
    pub max_cache_size: u64,

    /// Reissue policy for transient chunk read failures.
    pub retry: RetryConfig,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            part_size:           128 * 1024,
            storage_queue_limit: 16,
            web_queue_limit:     8,
            sessions_per_dc:     4,
            max_redirects:       5,
            max_cache_size:      10 * 1024 * 1024,
            retry:               RetryConfig::default(),
        }
    }
}

impl DownloaderConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    #[must_use]
    pub fn part_size(mut self, part_size: u32) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    #[must_use]
    pub fn storage_queue_limit(mut self, limit: usize) -> Self {
        self.storage_queue_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn web_queue_limit(mut self, limit: usize) -> Self {
        self.web_queue_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn sessions_per_dc(mut self, sessions: usize) -> Self {
        self.sessions_per_dc = sessions.max(1);
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn max_cache_size(mut self, max_cache_size: u64) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Chunk reissue policy.
///
/// The delay before attempt `n` (0-based) is `backoff_ms * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Reissues allowed per chunk offset. Zero disables retrying.
    ///
    /// Default: 3
    pub max_retries: u32,

    /// Base delay in milliseconds.
    ///
    /// Default: 100
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms:  100,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff_ms: backoff.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }

    pub fn backoff(&self) -> Duration { Duration::from_millis(self.backoff_ms) }
}

/// Where a loader may get its content from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadFromCloud {
    /// Try the local cache first, then the network.
    #[default]
    CloudOrLocal,
    /// Only the local cache; a miss cancels the loader.
    LocalOnly,
}

/// Per-loader options.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// File the content is written to.
    pub destination:  Option<PathBuf>,
    /// Declared total size, if known in advance.
    pub size:         Option<u64>,
    /// Keep the content in memory and mirror it into the local cache.
    pub to_cache:     bool,
    pub from_cloud:   LoadFromCloud,
    /// Started automatically rather than by an explicit user action.
    pub auto_loading: bool,
}

impl LoaderOptions {
    #[must_use]
    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }

    /// Declared size; zero means unknown.
    #[must_use]
    pub fn size(mut self, size: u64) -> Self {
        self.size = (size > 0).then_some(size);
        self
    }

    #[must_use]
    pub fn to_cache(mut self, to_cache: bool) -> Self {
        self.to_cache = to_cache;
        self
    }

    #[must_use]
    pub fn from_cloud(mut self, from_cloud: LoadFromCloud) -> Self {
        self.from_cloud = from_cloud;
        self
    }

    #[must_use]
    pub fn auto_loading(mut self, auto_loading: bool) -> Self {
        self.auto_loading = auto_loading;
        self
    }
}
