//! Extension trait for [`CacheBucket`] with typed convenience methods.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::CacheBucket;

/// Typed convenience methods for [`CacheBucket`].
///
/// Enrichment results are cached as JSON documents; [`CacheBucket`] itself
/// stays object-safe and byte-oriented.
///
/// # Example
///
/// ```
/// use basil_cache::{Cache, CacheBucketExt, NullCache};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Entity { label: String }
///
/// let cache = NullCache;
/// let bucket = cache.bucket("wikidata");
///
/// bucket.set_json("Q42", &Entity { label: "Douglas Adams".into() });
/// let entity: Option<Entity> = bucket.get_json("Q42");
/// assert!(entity.is_none());
/// ```
pub trait CacheBucketExt: CacheBucket {
    /// Retrieve a JSON-deserialized value from the cache.
    ///
    /// Returns `None` on cache miss, expiry, or deserialization failure.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Store a value as JSON in the cache.
    ///
    /// Silently does nothing if serialization fails.
    fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        if let Ok(bytes) = serde_json::to_vec(value) {
            self.set(key, &bytes);
        }
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cache, FileCache};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_json_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().to_path_buf(), Duration::from_secs(60));
        let bucket = cache.bucket("wikidata");

        let value = serde_json::json!({"id": "Q42", "labels": {"en": "Douglas Adams"}});
        bucket.set_json("Q42", &value);

        let cached: serde_json::Value = bucket.get_json("Q42").unwrap();
        assert_eq!(cached, value);
    }

    #[test]
    fn test_get_json_invalid_payload_misses() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().to_path_buf(), Duration::from_secs(60));
        let bucket = cache.bucket("wikidata");

        bucket.set("Q1", b"not json");
        let cached: Option<serde_json::Value> = bucket.get_json("Q1");
        assert!(cached.is_none());
    }
}
