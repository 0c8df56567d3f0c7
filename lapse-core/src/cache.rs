use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::options::{ItemOptions, Ttl};
use crate::store::Store;
use crate::sweeper::{self, SweeperHandle};

/// Shared state behind every clone of a [`Cache`]
struct CacheInner<V> {
    store: Arc<Store<V>>,
    config: CacheConfig,
    /// `None` when the cleanup interval is zero
    sweeper: Option<SweeperHandle>,
}

/// Thread-safe TTL cache with a background sweeper
///
/// Values of any `Send + Sync` type are stored behind an `Arc` and handed back as
/// shared handles. Expired entries read as absent immediately and are physically
/// removed by a background task that runs every `cleanup_interval`.
///
/// Cloning a `Cache` is cheap and every clone shares the same entries. The sweeper
/// stops when [`Cache::shutdown`] is called or when the last clone is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use lapse_core::{Cache, ItemOptions};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     // Entries live 5 minutes by default, sweep every 10 minutes
///     let cache = Cache::new(Duration::from_secs(300), Duration::from_secs(600));
///
///     cache.set("a", "aaa".to_string(), Duration::from_secs(3600));
///     assert_eq!(cache.get("a").as_deref().map(String::as_str), Some("aaa"));
///
///     let options = ItemOptions::new().on_delete(|v: &String| {
///         println!("releasing {v}");
///         Ok(())
///     });
///     cache.set_with_options("b", "bbb".to_string(), Duration::ZERO, options);
///
///     cache.delete("a").unwrap();
///     assert!(cache.get("a").is_none());
/// }
/// ```
pub struct Cache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Cache<V>
where
    V: Send + Sync + 'static,
{
    /// Creates a cache with the given default TTL and cleanup interval
    ///
    /// A zero `default_ttl` makes [`Ttl::Default`] entries never expire. A zero
    /// `cleanup_interval` disables the sweeper.
    ///
    /// # Panics
    ///
    /// Panics if `cleanup_interval` is non-zero and no Tokio runtime is available to
    /// spawn the sweeper on. Use [`Cache::try_new`] to get an error instead.
    pub fn new(default_ttl: Duration, cleanup_interval: Duration) -> Self {
        Self::with_config(
            CacheConfig::default()
                .with_default_ttl(default_ttl)
                .with_cleanup_interval(cleanup_interval),
        )
    }

    /// Creates a cache from a [`CacheConfig`]
    ///
    /// # Panics
    ///
    /// Panics if the configuration asks for a sweeper and no Tokio runtime is
    /// available. Use [`Cache::try_with_config`] to get an error instead.
    pub fn with_config(config: CacheConfig) -> Self {
        match Self::try_with_config(config) {
            Ok(cache) => cache,
            Err(err) => panic!(
                "lapse_core::Cache: {err}. Call Cache::new() or Cache::with_config() \
                 from within a #[tokio::main] or #[tokio::test] context, or use a zero \
                 cleanup interval"
            ),
        }
    }

    /// Fallible version of [`Cache::new`]
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::RuntimeUnavailable`] if a sweeper is requested outside
    /// a Tokio runtime.
    pub fn try_new(default_ttl: Duration, cleanup_interval: Duration) -> Result<Self, CacheError> {
        Self::try_with_config(
            CacheConfig::default()
                .with_default_ttl(default_ttl)
                .with_cleanup_interval(cleanup_interval),
        )
    }

    /// Fallible version of [`Cache::with_config`]
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::RuntimeUnavailable`] if a sweeper is requested outside
    /// a Tokio runtime.
    pub fn try_with_config(config: CacheConfig) -> Result<Self, CacheError> {
        let store = Arc::new(Store::new(config.default_ttl));

        let sweeper = if config.sweeps() {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(CacheError::RuntimeUnavailable);
            }
            Some(SweeperHandle::spawn(Arc::clone(&store), config.cleanup_interval))
        } else {
            tracing::debug!("cleanup interval is zero, expired entries will not be swept");
            None
        };

        Ok(Self {
            inner: Arc::new(CacheInner {
                store,
                config,
                sweeper,
            }),
        })
    }
}

impl<V> Cache<V> {
    /// The configuration this cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Stores a value with no deletion hook. See [`Cache::set_with_options`]
    pub fn set(&self, key: impl Into<String>, value: V, ttl: impl Into<Ttl>) {
        self.inner.store.set(key, value, ttl.into(), ItemOptions::new());
    }

    /// Stores a value under `key`, replacing any previous entry
    ///
    /// A zero duration (or [`Ttl::Default`]) uses the configured default TTL; if
    /// that is zero too the entry never expires. Replacing a key does **not** run
    /// the replaced entry's deletion hook.
    pub fn set_with_options(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: impl Into<Ttl>,
        options: ItemOptions<V>,
    ) {
        self.inner.store.set(key, value, ttl.into(), options);
    }

    /// Stores an already shared value, so the caller keeps a handle to it
    pub fn set_shared(
        &self,
        key: impl Into<String>,
        value: Arc<V>,
        ttl: impl Into<Ttl>,
        options: ItemOptions<V>,
    ) {
        self.inner.store.set_shared(key, value, ttl.into(), options);
    }

    /// Retrieves a value by key
    ///
    /// Returns `None` if the key is absent or expired, whether or not the sweeper has
    /// reclaimed it yet.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.inner.store.get(key)
    }

    /// Checks if a key exists and is not expired
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.store.contains_key(key)
    }

    /// Deletes a key, running its deletion hook before returning
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the key is not stored.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.store.delete(key)
    }

    /// Deletes every entry, running each deletion hook. Returns the number removed
    pub fn clear_all(&self) -> usize {
        self.inner.store.clear_all()
    }

    /// Every stored key, including expired entries the sweeper has not reached yet
    pub fn keys(&self) -> Vec<String> {
        self.inner.store.keys()
    }

    /// Keys whose deadline has passed
    pub fn expired_keys(&self) -> Vec<String> {
        self.inner.store.expired_keys()
    }

    /// Runs one sweep on the calling thread. Returns the number of entries removed
    ///
    /// The background sweeper does the same thing every cleanup interval.
    pub fn cleanup(&self) -> usize {
        sweeper::sweep(&self.inner.store)
    }

    /// Deadline of a stored entry; `Some(None)` means it never expires
    pub fn expires_at(&self, key: &str) -> Option<Option<Instant>> {
        self.inner.store.expires_at(key)
    }

    /// Insertion time of a stored entry
    pub fn created_at(&self, key: &str) -> Option<SystemTime> {
        self.inner.store.created_at(key)
    }

    /// Returns the number of entries in the cache (including expired ones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Returns `true` if the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Stops the background sweeper
    ///
    /// This is called automatically when the last clone is dropped. The cache stays
    /// usable afterwards but expired entries are only reclaimed by [`Cache::cleanup`].
    pub fn shutdown(&self) {
        if let Some(sweeper) = &self.inner.sweeper {
            sweeper.shutdown();
        }
    }

    /// Whether a background sweeper task is still alive
    pub fn is_sweeping(&self) -> bool {
        self.inner
            .sweeper
            .as_ref()
            .is_some_and(SweeperHandle::is_running)
    }
}
