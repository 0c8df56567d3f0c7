//! Per-entry options and TTL selection.

use std::fmt;
use std::time::Duration;

/// Callback run once with the stored value when an entry is removed.
///
/// Returned errors and panics are logged and otherwise ignored.
pub type DeleteHook<V> = Box<dyn FnOnce(&V) -> anyhow::Result<()> + Send + Sync + 'static>;

/// Lifetime requested for an entry at `set` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the cache's configured default TTL
    #[default]
    Default,
    /// The entry never expires, whatever the default is
    Never,
    /// Expire this long after insertion. `Duration::ZERO` behaves like [`Ttl::Default`]
    For(Duration),
}

impl Ttl {
    /// Resolves the effective lifetime against the cache default.
    ///
    /// `None` means the entry never expires.
    pub fn resolve(self, default_ttl: Duration) -> Option<Duration> {
        let duration = match self {
            Ttl::Never => return None,
            Ttl::Default => default_ttl,
            Ttl::For(d) if d.is_zero() => default_ttl,
            Ttl::For(d) => d,
        };
        (!duration.is_zero()).then_some(duration)
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::For(duration)
    }
}

/// Options attached to a single `set` call.
///
/// # Example
///
/// ```rust
/// use lapse_core::ItemOptions;
///
/// let options = ItemOptions::new()
///     .on_delete(|conn: &String| {
///         println!("closing {conn}");
///         Ok(())
///     })
///     .slide_on_access(true);
/// assert!(options.has_on_delete());
/// ```
pub struct ItemOptions<V> {
    pub(crate) on_delete: Option<DeleteHook<V>>,
    pub(crate) slide_on_access: bool,
}

impl<V> ItemOptions<V> {
    /// Options with no hook and a fixed deadline
    pub fn new() -> Self {
        Self {
            on_delete: None,
            slide_on_access: false,
        }
    }

    /// Sets the hook run when the entry is removed by delete, clear-all or sweep.
    ///
    /// Overwriting the key with another `set` drops the hook without running it.
    pub fn on_delete<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&V) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_delete = Some(Box::new(hook));
        self
    }

    /// Refresh the deadline to `now + ttl` every time a read finds the entry live
    pub fn slide_on_access(mut self, slide: bool) -> Self {
        self.slide_on_access = slide;
        self
    }

    /// Whether a deletion hook was supplied
    pub fn has_on_delete(&self) -> bool {
        self.on_delete.is_some()
    }
}

impl<V> Default for ItemOptions<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ItemOptions<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemOptions")
            .field("on_delete", &self.has_on_delete())
            .field("slide_on_access", &self.slide_on_access)
            .finish()
    }
}
