//! Persistent cache tier for basil.
//!
//! Two traits form the core API:
//!
//! - [`Cache`]: Factory for named cache buckets
//! - [`CacheBucket`]: Key-value store whose entries expire after a TTL
//!
//! # Implementations
//!
//! - [`NullCache`] / [`NullCacheBucket`]: No-op implementations (always miss)
//! - [`FileCache`]: File-based implementation, one directory per bucket
//!
//! # Example
//!
//! ```
//! use basil_cache::{Cache, NullCache};
//!
//! let cache = NullCache;
//! let bucket = cache.bucket("wikidata");
//! bucket.set("Q42", b"{}");
//! assert_eq!(bucket.get("Q42"), None); // NullCache always misses
//! ```

mod ext;
mod file;

pub use ext::CacheBucketExt;
pub use file::FileCache;

/// A named partition within a [`Cache`].
///
/// Entries are fresh for the lifetime configured on the owning cache. A stale
/// entry behaves exactly like a missing one.
pub trait CacheBucket: Send + Sync {
    /// Retrieve a cached value.
    ///
    /// Returns `None` on cache miss or when the entry has expired.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value in the cache, replacing any existing entry.
    fn set(&self, key: &str, value: &[u8]);
}

/// Factory for named cache [`CacheBucket`]s.
///
/// Buckets produced by one cache are isolated from each other. The file-based
/// cache stores each bucket in its own subdirectory.
pub trait Cache: Send + Sync {
    /// Open or create a named bucket (e.g. `"wikidata"`, `"json_example.org"`).
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// No-op [`CacheBucket`] that never stores or retrieves data.
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _value: &[u8]) {}
}

/// No-op [`Cache`] that always returns [`NullCacheBucket`]s.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullCacheBucket)
    }
}
