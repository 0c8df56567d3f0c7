use std::time::Duration;

/// Environment variable holding the default TTL in seconds
pub const DEFAULT_TTL_ENV: &str = "LAPSE_DEFAULT_TTL_SECS";

/// Environment variable holding the sweep interval in seconds
pub const CLEANUP_INTERVAL_ENV: &str = "LAPSE_CLEANUP_INTERVAL_SECS";

/// Configuration for a cache instance
///
/// # Example
///
/// ```rust
/// use lapse_core::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::default()
///     .with_default_ttl(Duration::from_secs(300))
///     .with_cleanup_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied when an entry is stored with [`Ttl::Default`](crate::Ttl::Default).
    /// Zero means such entries never expire (default: zero)
    pub default_ttl: Duration,

    /// Interval between background sweeps (default: 60 seconds).
    /// Zero disables the sweeper entirely
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::ZERO,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL used for entries stored without an explicit lifetime
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the cleanup interval
    ///
    /// This determines how often the background task looks for expired entries.
    /// Passing `Duration::ZERO` disables active reclamation: expired entries then
    /// stay resident until they are deleted explicitly.
    ///
    /// # Example
    ///
    /// ```rust
    /// use lapse_core::CacheConfig;
    /// use std::time::Duration;
    ///
    /// // Sweep every 30 seconds
    /// let config = CacheConfig::default()
    ///     .with_cleanup_interval(Duration::from_secs(30));
    /// ```
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Whether a background sweeper should be started for this configuration
    pub fn sweeps(&self) -> bool {
        !self.cleanup_interval.is_zero()
    }

    /// Create a configuration from environment variables.
    ///
    /// Reads:
    /// - `LAPSE_DEFAULT_TTL_SECS` - default TTL in seconds (defaults to 0, never expire)
    /// - `LAPSE_CLEANUP_INTERVAL_SECS` - sweep interval in seconds (defaults to 60)
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |name: &str| lookup(name).and_then(|raw| raw.trim().parse::<u64>().ok());

        Self {
            default_ttl: secs(DEFAULT_TTL_ENV)
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            cleanup_interval: secs(CLEANUP_INTERVAL_ENV)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
        }
    }
}
