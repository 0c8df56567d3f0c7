//! Error types for the lapse cache.

use thiserror::Error;

/// Errors that can cross the cache's public boundary.
///
/// Deletion hook failures never show up here: they are logged at the point
/// of invocation and swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// `delete` was called for a key that is not stored
    #[error("key not found: {key}")]
    NotFound {
        /// The key that was looked up
        key: String,
    },

    /// A background sweeper was requested but no Tokio runtime is available
    #[error("a Tokio runtime is required to run the background sweeper")]
    RuntimeUnavailable,
}

impl CacheError {
    /// Returns `true` if this error is [`CacheError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }

    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        CacheError::NotFound { key: key.into() }
    }
}
