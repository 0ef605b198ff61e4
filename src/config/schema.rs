//! Configuration schema for the clientlib cache
//!
//! Configuration is stored at `~/.config/clientlib/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Smallest worker pool the build pipeline runs with
pub const MIN_THREAD_POOL: usize = 5;

/// Largest number of concurrent builds a pool can drain on shutdown
pub const MAX_CONCURRENT_BUILDS: usize = if (u32::MAX as usize) < Semaphore::MAX_PERMITS {
    u32::MAX as usize
} else {
    Semaphore::MAX_PERMITS
};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Clientlib source library
    pub library: LibraryConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Build worker pool
    pub threadpool: ThreadPoolConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Where clientlib sources are resolved from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directory holding the clientlib sources
    pub root: PathBuf,

    /// URL prefix used when rendering links
    pub url_prefix: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            url_prefix: String::new(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve gzip encoded content when requested (default: false)
    pub gzip_enabled: bool,

    /// Prefix for all cache keys
    pub root: String,

    /// Directory backing the cache store (default: state dir)
    pub dir: Option<PathBuf>,

    /// Size of the producer/consumer pipe in KiB
    pub pipe_buffer_kb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            gzip_enabled: false,
            root: "/var/cache/clientlibs".to_string(),
            dir: None,
            pipe_buffer_kb: 64,
        }
    }
}

impl CacheConfig {
    /// Pipe buffer size in bytes, never zero
    pub fn pipe_buffer_bytes(&self) -> usize {
        self.pipe_buffer_kb.max(1) * 1024
    }
}

/// Build worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Worker threads kept for builds (clamped to at least 5)
    pub min: usize,

    /// Concurrently running builds (clamped to at least `min`). Also caps
    /// the threads serving blocking file reads of builds.
    pub max: usize,

    /// How long an idle file-reading thread is kept alive. Worker threads
    /// live as long as the pool.
    pub idle_timeout_ms: u64,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            min: MIN_THREAD_POOL,
            max: 20,
            idle_timeout_ms: 200,
        }
    }
}

impl ThreadPoolConfig {
    /// Return the pool bounds with out-of-range values clamped
    pub fn clamped(&self) -> (usize, usize) {
        let mut min = self.min;
        if min < MIN_THREAD_POOL {
            warn!(
                "threadpool.min {} is below {}, using {}",
                min, MIN_THREAD_POOL, MIN_THREAD_POOL
            );
            min = MIN_THREAD_POOL;
        }

        let mut max = self.max;
        if max < min {
            warn!("threadpool.max {} is below min {}, using {}", max, min, min);
            max = min;
        }
        if max > MAX_CONCURRENT_BUILDS {
            warn!(
                "threadpool.max {} is above {}, using {}",
                max, MAX_CONCURRENT_BUILDS, MAX_CONCURRENT_BUILDS
            );
            max = MAX_CONCURRENT_BUILDS;
            min = min.min(max);
        }

        (min, max)
    }

    /// Keep-alive of idle file-reading threads
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[threadpool]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.root, "/var/cache/clientlibs");
        assert!(!config.cache.gzip_enabled);
        assert_eq!(config.threadpool.min, 5);
        assert_eq!(config.threadpool.max, 20);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            gzip_enabled = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.cache.gzip_enabled);
        assert_eq!(config.cache.root, "/var/cache/clientlibs"); // default preserved
    }

    #[test]
    fn threadpool_min_clamped() {
        let pool = ThreadPoolConfig {
            min: 1,
            max: 3,
            idle_timeout_ms: 200,
        };
        assert_eq!(pool.clamped(), (5, 5));
    }

    #[test]
    fn threadpool_max_clamped_to_min() {
        let pool = ThreadPoolConfig {
            min: 8,
            max: 6,
            idle_timeout_ms: 200,
        };
        assert_eq!(pool.clamped(), (8, 8));
    }

    #[test]
    fn threadpool_valid_bounds_untouched() {
        assert_eq!(ThreadPoolConfig::default().clamped(), (5, 20));
    }

    #[test]
    fn threadpool_max_fits_semaphore_drain() {
        let pool = ThreadPoolConfig {
            min: 5,
            max: usize::MAX,
            idle_timeout_ms: 200,
        };
        let (min, max) = pool.clamped();
        assert_eq!(min, 5);
        assert_eq!(max, MAX_CONCURRENT_BUILDS);
        assert!(u32::try_from(max).is_ok());
        assert!(max <= Semaphore::MAX_PERMITS);
    }

    #[test]
    fn pipe_buffer_never_zero() {
        let cache = CacheConfig {
            pipe_buffer_kb: 0,
            ..CacheConfig::default()
        };
        assert_eq!(cache.pipe_buffer_bytes(), 1024);
    }
}
