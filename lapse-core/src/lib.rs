//! # Lapse Core
//!
//! An in-process key-value cache with per-entry TTL and a background sweeper.
//!
//! ## Features
//!
//! - Generic values, stored once behind an `Arc` and handed back as shared handles
//! - One reader/writer lock over the whole map: reads run in parallel, writes are exclusive
//! - Lazy expiration on read: an expired entry reads as absent immediately
//! - Background sweeper per cache instance that physically removes expired entries
//! - Per-entry deletion hooks, run exactly once on delete, clear-all or sweep, with
//!   errors and panics contained and logged through `tracing`
//! - Optional sliding expiration per entry
//!
//! ## Example
//!
//! ```rust,no_run
//! use lapse_core::{Cache, CacheConfig, ItemOptions, Ttl};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Five minute default TTL, sweep every 30 seconds
//!     let config = CacheConfig::default()
//!         .with_default_ttl(Duration::from_secs(300))
//!         .with_cleanup_interval(Duration::from_secs(30));
//!     let cache: Cache<String> = Cache::with_config(config);
//!
//!     // Uses the default TTL
//!     cache.set("user:123", "John Doe".to_string(), Ttl::Default);
//!
//!     // Never expires, and releases something when removed
//!     let options = ItemOptions::new().on_delete(|conn: &String| {
//!         println!("closing {conn}");
//!         Ok(())
//!     });
//!     cache.set_with_options("conn:1", "postgres://...".to_string(), Ttl::Never, options);
//!
//!     if let Some(value) = cache.get("user:123") {
//!         println!("User: {}", value);
//!     }
//!
//!     // Runs the hook before returning
//!     cache.delete("conn:1").unwrap();
//!
//!     // Manual sweep (also done automatically by the background task)
//!     let removed_count = cache.cleanup();
//! }
//! ```

mod cache;
mod config;
mod entry;
mod error;
mod options;
mod store;
mod sweeper;

pub use cache::Cache;
pub use config::{CacheConfig, CLEANUP_INTERVAL_ENV, DEFAULT_TTL_ENV};
pub use entry::Entry;
pub use error::CacheError;
pub use options::{DeleteHook, ItemOptions, Ttl};
pub use store::Store;

/// Deadlines are measured on Tokio's clock so paused test time drives expiry
pub use tokio::time::Instant;
