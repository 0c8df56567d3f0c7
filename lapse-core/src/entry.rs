use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::options::{DeleteHook, ItemOptions};

/// Represents a stored value with its expiration deadline and deletion hook
pub struct Entry<V> {
    value: Arc<V>,
    /// `None` means the entry never expires
    expires_at: Option<Instant>,
    /// Resolved lifetime, kept for sliding refreshes
    ttl: Option<Duration>,
    created_at: SystemTime,
    on_delete: Option<DeleteHook<V>>,
    slide_on_access: bool,
}

impl<V> Entry<V> {
    /// Creates a new entry that expires `ttl` after `now`, or never when `ttl` is `None`
    pub fn new(value: Arc<V>, ttl: Option<Duration>, now: Instant, options: ItemOptions<V>) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
            ttl,
            created_at: SystemTime::now(),
            on_delete: options.on_delete,
            slide_on_access: options.slide_on_access,
        }
    }

    /// Returns the stored value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns a shared handle to the stored value (no copy of `V`)
    pub fn value_shared(&self) -> Arc<V> {
        Arc::clone(&self.value)
    }

    /// Returns the expiration deadline, `None` if the entry never expires
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns when the entry was inserted
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Whether reads push the deadline forward
    pub fn slides_on_access(&self) -> bool {
        self.slide_on_access && self.expires_at.is_some()
    }

    /// Checks if this entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks expiry against a caller-supplied clock reading
    pub fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now > deadline)
    }

    /// Moves the deadline to `now + ttl`. No-op for entries that never expire
    pub fn refresh(&mut self, now: Instant) {
        if let Some(ttl) = self.ttl {
            self.expires_at = now.checked_add(ttl);
        }
    }

    /// Consumes the entry and runs its deletion hook, if any.
    ///
    /// Errors and panics raised by the hook are logged and swallowed.
    pub(crate) fn run_on_delete(self, key: &str) {
        let Some(hook) = self.on_delete else {
            return;
        };

        let value = self.value;
        match panic::catch_unwind(AssertUnwindSafe(|| hook(&*value))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(key = %key, error = %err, "on_delete hook returned an error");
            }
            Err(payload) => {
                tracing::error!(key = %key, panic = %panic_message(&*payload), "on_delete hook panicked");
            }
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("value", &self.value)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("on_delete", &self.on_delete.is_some())
            .field("slide_on_access", &self.slide_on_access)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
