use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::entry::Entry;
use crate::error::CacheError;
use crate::options::{ItemOptions, Ttl};

/// Thread-safe map from key to [`Entry`] behind a single reader/writer lock.
///
/// Reads (`get`, `keys`, `expired_keys`) share the lock; every mutation takes it
/// exclusively. Removal (delete, clear-all, sweep) detaches entries under the
/// write lock and hands them to a single release step that runs their deletion
/// hooks once the lock is released. A hook may therefore call back into
/// the store without deadlocking, but it still runs before the removing call
/// returns: keep hooks fast.
///
/// `Store` never spawns anything. Active reclamation is the job of the sweeper
/// owned by [`Cache`](crate::Cache).
pub struct Store<V> {
    data: RwLock<HashMap<String, Entry<V>>>,
    default_ttl: Duration,
}

impl<V> Store<V> {
    /// Creates an empty store. `default_ttl` is applied to [`Ttl::Default`] entries;
    /// zero means they never expire
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// TTL substituted for entries stored with [`Ttl::Default`]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores a value under `key`, replacing any previous entry.
    ///
    /// # TTL Semantics
    ///
    /// - [`Ttl::Default`] or a zero [`Ttl::For`] uses the store's default TTL.
    /// - If the resolved duration is positive the entry expires that long from now,
    ///   otherwise it never expires.
    /// - [`Ttl::Never`] always means never.
    ///
    /// Replacing a key drops the previous entry **without** running its deletion hook.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Ttl, options: ItemOptions<V>) {
        self.set_shared(key, Arc::new(value), ttl, options)
    }

    /// Like [`Store::set`] for a value that is already reference-counted
    pub fn set_shared(&self, key: impl Into<String>, value: Arc<V>, ttl: Ttl, options: ItemOptions<V>) {
        let key = key.into();
        let entry = Entry::new(value, ttl.resolve(self.default_ttl), Instant::now(), options);

        // The replaced entry is dropped after the guard, hook unrun.
        let _replaced = self.data.write().insert(key, entry);
    }

    /// Retrieves a value by key
    ///
    /// Returns `None` if the key doesn't exist or its deadline has passed.
    /// Expired entries stay in the map until they are swept or deleted.
    /// Entries stored with `slide_on_access` get a fresh deadline on every hit.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();
        {
            let data = self.data.read();
            let entry = data.get(key)?;
            if entry.is_expired_at(now) {
                return None;
            }
            if !entry.slides_on_access() {
                return Some(entry.value_shared());
            }
        }

        // Sliding refresh needs the write lock; the entry may have changed meanwhile.
        let mut data = self.data.write();
        let entry = data.get_mut(key)?;
        if entry.is_expired_at(now) {
            return None;
        }
        if entry.slides_on_access() {
            entry.refresh(now);
        }
        Some(entry.value_shared())
    }

    /// Checks if a key exists and is not expired. Does not slide the deadline
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.data
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Deletes a key and runs its deletion hook before returning.
    ///
    /// Deletes expired-but-unswept entries too.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the key is not stored.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self.remove_keys([key]) {
            0 => Err(CacheError::not_found(key)),
            _ => Ok(()),
        }
    }

    /// Deletes every entry, running each deletion hook.
    ///
    /// Returns the number of entries removed. A failing hook does not stop the
    /// remaining ones.
    pub fn clear_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.data.write());
        let count = drained.len();
        Self::release(drained);
        count
    }

    /// Removes the given keys, running their deletion hooks.
    ///
    /// Keys that are no longer stored are skipped. Returns the number removed.
    pub fn remove_keys<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.remove_keys_where(keys, |_| true)
    }

    /// Removes the given keys if they are still expired, running their deletion hooks.
    ///
    /// This is the sweeper's removal path: a key refreshed by a concurrent `set`
    /// between the scan and the removal survives.
    pub fn remove_expired_keys<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let now = Instant::now();
        self.remove_keys_where(keys, |entry| entry.is_expired_at(now))
    }

    fn remove_keys_where<I, K>(&self, keys: I, should_remove: impl Fn(&Entry<V>) -> bool) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let detached: Vec<(String, Entry<V>)> = {
            let mut data = self.data.write();
            keys.into_iter()
                .filter_map(|key| {
                    let key = key.as_ref();
                    if data.get(key).is_some_and(&should_remove) {
                        data.remove_entry(key)
                    } else {
                        None
                    }
                })
                .collect()
        };

        let count = detached.len();
        Self::release(detached);
        count
    }

    fn release(detached: impl IntoIterator<Item = (String, Entry<V>)>) {
        for (key, entry) in detached {
            entry.run_on_delete(&key);
        }
    }

    /// Removes every expired entry right now. Returns the number removed
    pub fn cleanup(&self) -> usize {
        let expired = self.expired_keys();
        if expired.is_empty() {
            return 0;
        }
        self.remove_expired_keys(&expired)
    }

    /// Returns every stored key, including expired entries not yet swept
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Returns the keys whose deadline has passed
    pub fn expired_keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.data
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the deadline of a stored entry. The outer `None` means the key is
    /// absent; `Some(None)` means the entry never expires
    pub fn expires_at(&self, key: &str) -> Option<Option<Instant>> {
        self.data.read().get(key).map(Entry::expires_at)
    }

    /// Returns when a stored entry was inserted, expired or not
    pub fn created_at(&self, key: &str) -> Option<SystemTime> {
        self.data.read().get(key).map(Entry::created_at)
    }

    /// Returns the number of entries in the store (including expired ones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const MINUTE: Duration = Duration::from_secs(60);

    fn counting_hook<V>(counter: &Arc<AtomicUsize>) -> ItemOptions<V> {
        let counter = Arc::clone(counter);
        ItemOptions::new().on_delete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Stores an entry whose deadline is already behind us
    fn set_expired<V>(store: &Store<V>, key: &str, value: V, options: ItemOptions<V>) {
        let entry = Entry::new(
            Arc::new(value),
            Some(Duration::from_millis(1)),
            Instant::now() - Duration::from_secs(1),
            options,
        );
        store.data.write().insert(key.to_string(), entry);
    }

    #[test]
    fn test_set_and_get() {
        let store = Store::new(Duration::ZERO);
        store.set("key1", "value1".to_string(), Ttl::from(MINUTE), ItemOptions::new());

        assert_eq!(store.get("key1").as_deref(), Some(&"value1".to_string()));
    }

    #[test]
    fn test_get_returns_shared_handle() {
        let store = Store::new(Duration::ZERO);
        let value = Arc::new(vec![1u8, 2, 3]);
        store.set_shared("blob", Arc::clone(&value), Ttl::Never, ItemOptions::new());

        let fetched = store.get("blob").unwrap();
        assert!(Arc::ptr_eq(&fetched, &value));
    }

    #[test]
    fn test_get_nonexistent_key() {
        let store: Store<String> = Store::new(Duration::ZERO);
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_overwrite_key() {
        let store = Store::new(Duration::ZERO);
        store.set("key1", 1, Ttl::Default, ItemOptions::new());
        store.set("key1", 2, Ttl::Default, ItemOptions::new());

        assert_eq!(store.get("key1").as_deref(), Some(&2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_does_not_run_old_hook() {
        let store = Store::new(Duration::ZERO);
        let old_hook = Arc::new(AtomicUsize::new(0));
        let new_hook = Arc::new(AtomicUsize::new(0));

        store.set("k", 1, Ttl::Default, counting_hook(&old_hook));
        store.set("k", 2, Ttl::Default, counting_hook(&new_hook));
        assert_eq!(old_hook.load(Ordering::SeqCst), 0);

        store.delete("k").unwrap();
        assert_eq!(old_hook.load(Ordering::SeqCst), 0);
        assert_eq!(new_hook.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delete() {
        let store = Store::new(Duration::ZERO);
        store.set("key1", "value1", Ttl::from(MINUTE), ItemOptions::new());

        assert!(store.delete("key1").is_ok());
        assert!(store.get("key1").is_none());

        let err = store.delete("key1").unwrap_err();
        assert_eq!(err, CacheError::NotFound { key: "key1".to_string() });
    }

    #[test]
    fn test_delete_missing_key_leaves_store_unchanged() {
        let store = Store::new(Duration::ZERO);
        store.set("a", 1, Ttl::Never, ItemOptions::new());

        assert!(store.delete("b").unwrap_err().is_not_found());
        assert_eq!(store.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_delete_runs_hook_once() {
        let store = Store::new(Duration::ZERO);
        let fired = Arc::new(AtomicUsize::new(0));
        store.set("k", "v", Ttl::Never, counting_hook(&fired));

        store.delete("k").unwrap();
        let _ = store.delete("k");
        store.clear_all();
        store.cleanup();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delete_removes_expired_entry() {
        let store = Store::new(Duration::ZERO);
        let fired = Arc::new(AtomicUsize::new(0));
        set_expired(&store, "stale", 1, counting_hook(&fired));

        assert!(store.delete("stale").is_ok());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_receives_value() {
        let store = Store::new(Duration::ZERO);
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_hook = Arc::clone(&seen);
        let options = ItemOptions::new().on_delete(move |v: &String| {
            *seen_hook.lock() = Some(v.clone());
            Ok(())
        });
        store.set("conn", "db-handle".to_string(), Ttl::Never, options);

        store.delete("conn").unwrap();
        assert_eq!(seen.lock().as_deref(), Some("db-handle"));
    }

    #[test]
    fn test_hook_may_reenter_store() {
        let store = Arc::new(Store::new(Duration::ZERO));
        let inner = Arc::clone(&store);
        let options = ItemOptions::new().on_delete(move |_: &u32| {
            inner.set("tombstone", 0, Ttl::Never, ItemOptions::new());
            Ok(())
        });
        store.set("k", 1, Ttl::Never, options);

        store.delete("k").unwrap();
        assert!(store.contains_key("tombstone"));
    }

    #[test]
    fn test_clear_all_runs_every_hook_despite_failures() {
        let store = Store::new(Duration::ZERO);
        let fired = Arc::new(AtomicUsize::new(0));

        store.set("ok1", 1, Ttl::Never, counting_hook(&fired));
        store.set("err", 2, Ttl::Never, ItemOptions::new().on_delete(|_: &i32| Err(anyhow::anyhow!("nope"))));
        store.set("panic", 3, Ttl::Never, ItemOptions::new().on_delete(|_: &i32| panic!("hook blew up")));
        store.set("ok2", 4, Ttl::Never, counting_hook(&fired));
        store.set("plain", 5, Ttl::Never, ItemOptions::new());

        assert_eq!(store.clear_all(), 5);
        assert!(store.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_all_empty_store() {
        let store: Store<()> = Store::new(Duration::ZERO);
        assert_eq!(store.clear_all(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_entry_returns_none_but_stays_resident() {
        let store = Store::new(Duration::ZERO);
        set_expired(&store, "key1", "value1", ItemOptions::new());

        assert!(store.get("key1").is_none());
        assert!(!store.contains_key("key1"));
        assert_eq!(store.keys(), vec!["key1".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_keys_include_expired() {
        let store = Store::new(Duration::ZERO);
        store.set("key1", 1, Ttl::from(MINUTE), ItemOptions::new());
        store.set("key2", 2, Ttl::Never, ItemOptions::new());
        set_expired(&store, "expired", 3, ItemOptions::new());

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["expired", "key1", "key2"]);

        assert_eq!(store.expired_keys(), vec!["expired".to_string()]);
    }

    #[test]
    fn test_cleanup() {
        let store = Store::new(Duration::ZERO);
        let fired = Arc::new(AtomicUsize::new(0));

        set_expired(&store, "expired1", 1, counting_hook(&fired));
        set_expired(&store, "expired2", 2, ItemOptions::new());
        store.set("valid", 3, Ttl::from(MINUTE), counting_hook(&fired));
        store.set("forever", 4, Ttl::Never, ItemOptions::new());

        assert_eq!(store.cleanup(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("valid").as_deref(), Some(&3));
    }

    #[test]
    fn test_remove_keys_skips_missing() {
        let store = Store::new(Duration::ZERO);
        store.set("a", 1, Ttl::Never, ItemOptions::new());
        store.set("b", 2, Ttl::Never, ItemOptions::new());

        assert_eq!(store.remove_keys(["a", "ghost", "a"]), 1);
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn test_remove_expired_keys_spares_refreshed_entry() {
        let store = Store::new(Duration::ZERO);
        set_expired(&store, "k", 1, ItemOptions::new());
        let expired = store.expired_keys();

        // A writer refreshes the key between the scan and the removal.
        store.set("k", 2, Ttl::from(MINUTE), ItemOptions::new());

        assert_eq!(store.remove_expired_keys(&expired), 0);
        assert_eq!(store.get("k").as_deref(), Some(&2));
    }

    #[test]
    fn test_default_ttl_applied() {
        let store = Store::new(Duration::from_secs(300));
        store.set("default", 1, Ttl::Default, ItemOptions::new());
        store.set("zero", 2, Ttl::For(Duration::ZERO), ItemOptions::new());
        store.set("never", 3, Ttl::Never, ItemOptions::new());

        assert!(store.expires_at("default").unwrap().is_some());
        assert!(store.expires_at("zero").unwrap().is_some());
        assert_eq!(store.expires_at("never"), Some(None));
        assert_eq!(store.expires_at("missing"), None);
    }

    #[test]
    fn test_zero_default_ttl_means_never_expire() {
        let store = Store::new(Duration::ZERO);
        store.set("key1", "value1", Ttl::Default, ItemOptions::new());

        thread::sleep(Duration::from_millis(50));

        assert!(store.get("key1").is_some());
        assert_eq!(store.expires_at("key1"), Some(None));
        assert!(store.expired_keys().is_empty());
    }

    #[test]
    fn test_extreme_ttl_does_not_panic() {
        let store = Store::new(Duration::ZERO);
        store.set("key1", "value1", Ttl::For(Duration::MAX), ItemOptions::new());

        assert!(store.get("key1").is_some());
    }

    #[test]
    fn test_created_at_recorded() {
        let before = SystemTime::now();
        let store = Store::new(Duration::ZERO);
        store.set("k", (), Ttl::Never, ItemOptions::new());

        let created = store.created_at("k").unwrap();
        assert!(created >= before);
        assert!(store.created_at("missing").is_none());
    }

    #[test]
    fn test_len_and_is_empty() {
        let store = Store::new(Duration::ZERO);

        assert!(store.is_empty());
        assert_eq!(store.len(), 0);

        store.set("key1", "value1", Ttl::Default, ItemOptions::new());

        assert!(!store.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_writes() {
        let store = Arc::new(Store::new(Duration::ZERO));
        let mut handles = vec![];

        for thread_id in 0..10 {
            let store = Arc::clone(&store);
            let handle = thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("thread{}:key{}", thread_id, i);
                    store.set(key, i, Ttl::from(MINUTE), ItemOptions::new());
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(store.len(), 1000);
    }

    #[test]
    fn test_concurrent_deletes_fire_each_hook_once() {
        let store = Arc::new(Store::new(Duration::ZERO));
        let fired = Arc::new(AtomicUsize::new(0));
        for i in 0..200 {
            store.set(format!("key{}", i), i, Ttl::Never, counting_hook(&fired));
        }

        let successes = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let successes = Arc::clone(&successes);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    if store.delete(&format!("key{}", i)).is_ok() {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        let clearer = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            clearer.clear_all();
        }));

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert!(store.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 200);
        assert!(successes.load(Ordering::SeqCst) <= 200);
    }

    #[test]
    fn test_concurrent_reads_and_writes() {
        let store = Arc::new(Store::new(Duration::ZERO));

        for i in 0..100 {
            store.set(format!("key{}", i), format!("value{}", i), Ttl::from(MINUTE), ItemOptions::new());
        }

        let successful_reads = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..5 {
            let store = Arc::clone(&store);
            let successful_reads = Arc::clone(&successful_reads);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    if store.get(&format!("key{}", i)).is_some() {
                        successful_reads.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }

        for thread_id in 0..5 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("new_thread{}:key{}", thread_id, i);
                    store.set(key, "new_value".to_string(), Ttl::from(MINUTE), ItemOptions::new());
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(successful_reads.load(Ordering::SeqCst), 500);
        assert_eq!(store.len(), 600);
    }
}
