//! File-based cache implementation.
//!
//! [`FileCache`] stores cache entries as files on disk, organized into buckets
//! (subdirectories). Each entry is a single file with a binary header followed
//! by the data:
//!
//! ```text
//! [stored_at: u64 LE, seconds since the Unix epoch][data bytes]
//! ```
//!
//! On read, only the header is read first to check freshness. The data is read
//! only when the entry is still within its time-to-live.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{Cache, CacheBucket};

/// File-based [`Cache`] rooted at a directory on disk.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- wikidata/          # bucket "wikidata"
/// |   +-- 3f2a...        # cache entry
/// +-- json_example.org/  # bucket "json_example.org"
///     +-- ...
/// ```
///
/// A zero TTL disables expiry: entries stay fresh until overwritten or removed.
pub struct FileCache {
    root: PathBuf,
    ttl: Duration,
}

impl FileCache {
    /// Create a file-based cache at `root` whose entries expire after `ttl`.
    ///
    /// The root directory is created lazily on the first write.
    #[must_use]
    pub fn new(root: PathBuf, ttl: Duration) -> Self {
        Self { root, ttl }
    }

    /// Root directory of the cache.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileCacheBucket {
            dir: self.root.join(name),
            ttl: self.ttl,
        })
    }
}

/// A single bucket backed by a directory on disk.
struct FileCacheBucket {
    dir: PathBuf,
    ttl: Duration,
}

impl FileCacheBucket {
    fn is_fresh(&self, stored_at: u64) -> bool {
        if self.ttl.is_zero() {
            return true;
        }
        now_secs().saturating_sub(stored_at) <= self.ttl.as_secs()
    }
}

impl CacheBucket for FileCacheBucket {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.dir.join(key);
        let mut file = File::open(&path).ok()?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header).ok()?;
        let stored_at = u64::from_le_bytes(header);

        if !self.is_fresh(stored_at) {
            tracing::debug!(key, bucket = %self.dir.display(), "cache entry expired");
            return None;
        }

        let mut data = Vec::new();
        file.read_to_end(&mut data).ok()?;
        Some(data)
    }

    fn set(&self, key: &str, value: &[u8]) {
        write_entry(&self.dir.join(key), now_secs(), value);
    }
}

/// Write an entry with an explicit timestamp.
///
/// Errors are ignored: a failed write only costs a future cache miss.
fn write_entry(path: &Path, stored_at: u64, value: &[u8]) {
    let Some(parent) = path.parent() else {
        return;
    };
    if let Err(e) = fs::create_dir_all(parent) {
        tracing::warn!("failed to create cache directory {}: {e}", parent.display());
        return;
    }

    let mut buf = Vec::with_capacity(8 + value.len());
    buf.extend_from_slice(&stored_at.to_le_bytes());
    buf.extend_from_slice(value);

    if let Err(e) = fs::write(path, &buf) {
        tracing::warn!("failed to write cache entry {}: {e}", path.display());
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
