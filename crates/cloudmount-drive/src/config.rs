//! Mount configuration for the virtual drive.
//!
//! Defaults are tuned for a high-latency remote store. Use
//! [`MountConfig::local()`] for fast backends and tests.

use cloudmount_cache::{DEFAULT_LISTING_TTL, DEFAULT_NODE_TTL, DEFAULT_RETRY_DELAY, TreeCacheConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Default timeout for a single read callback (30 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on async provider calls made from a callback thread (60 seconds).
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Default name of the synthetic alternate stream carrying node info.
pub const DEFAULT_INFO_STREAM_NAME: &str = "CloudDriveInfo";

/// Configuration options for the virtual drive.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Reject every mutating callback with access denied.
    pub read_only: bool,

    /// Time-to-live for cached node metadata.
    ///
    /// Default: 300 seconds (network mode) or 1 second (local mode).
    pub node_ttl: Duration,

    /// Time-to-live for cached directory listings.
    ///
    /// Default: 60 seconds (network mode) or 500ms (local mode).
    pub listing_ttl: Duration,

    /// Maximum time a read waits for bytes that are still downloading.
    pub read_timeout: Duration,

    /// Maximum time a callback thread blocks on an async provider call.
    pub provider_timeout: Duration,

    /// Back-off between download round-trips that came up short.
    pub download_retry_delay: Duration,

    /// Directory holding staged file content, keyed by remote id.
    pub cache_dir: PathBuf,

    /// Alternate stream name that serves the node info blob.
    pub info_stream_name: String,
}

impl Default for MountConfig {
    /// Returns the default configuration optimized for remote stores.
    fn default() -> Self {
        Self {
            read_only: false,
            node_ttl: DEFAULT_NODE_TTL,
            listing_ttl: DEFAULT_LISTING_TTL,
            read_timeout: DEFAULT_READ_TIMEOUT,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            download_retry_delay: DEFAULT_RETRY_DELAY,
            cache_dir: std::env::temp_dir().join("CloudDriveCache"),
            info_stream_name: DEFAULT_INFO_STREAM_NAME.to_string(),
        }
    }
}

impl MountConfig {
    /// Creates a configuration for fast local backends.
    ///
    /// Uses short TTLs and timeouts so tests observe expiry quickly.
    pub fn local() -> Self {
        Self {
            node_ttl: Duration::from_secs(1),
            listing_ttl: Duration::from_millis(500),
            read_timeout: Duration::from_secs(5),
            provider_timeout: Duration::from_secs(10),
            download_retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// Tree cache TTLs derived from this configuration.
    pub fn tree_cache_config(&self) -> TreeCacheConfig {
        TreeCacheConfig {
            node_ttl: self.node_ttl,
            listing_ttl: self.listing_ttl,
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the cache TTL for node metadata.
    #[must_use]
    pub fn node_ttl(mut self, ttl: Duration) -> Self {
        self.node_ttl = ttl;
        self
    }

    /// Sets the cache TTL for directory listings.
    #[must_use]
    pub fn listing_ttl(mut self, ttl: Duration) -> Self {
        self.listing_ttl = ttl;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    #[must_use]
    pub fn download_retry_delay(mut self, delay: Duration) -> Self {
        self.download_retry_delay = delay;
        self
    }

    /// Sets the staging directory for downloaded content.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    #[must_use]
    pub fn info_stream_name(mut self, name: impl Into<String>) -> Self {
        self.info_stream_name = name.into();
        self
    }
}
