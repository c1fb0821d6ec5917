//! The two-tier cache every enrichment operation goes through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use basil_cache::{Cache, CacheBucketExt, FileCache};
use basil_config::Config;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::EnrichError;
use crate::fetch::{Fetcher, HttpFetcher};

/// User agent sent with every request.
const USER_AGENT: &str = concat!("basil/", env!("CARGO_PKG_VERSION"));

/// Credentials and tuning taken from the site configuration.
#[derive(Debug, Clone, Default)]
pub struct EnrichSettings {
    /// Photo-service API key.
    pub flickr_api_key: Option<String>,
    /// Media-repository query service token.
    pub commons_token: Option<String>,
    /// Thumbnail width for media-repository lookups.
    pub embed_width: u32,
}

impl EnrichSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flickr_api_key: config.flickr.as_ref().map(|f| f.api_key.clone()),
            commons_token: config.commons.wcqs_auth_token.clone(),
            embed_width: config.embed_width,
        }
    }
}

/// Cached access to external data for one build.
///
/// Lookups check an in-memory map first, then the persistent cache under
/// `cache/<namespace>/`, and only then call out. Results are written to
/// both tiers. Failures are never cached.
pub struct ExternalDataCache {
    pub(crate) cache_dir: PathBuf,
    pub(crate) output_dir: PathBuf,
    pub(crate) settings: EnrichSettings,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    persistent: Box<dyn Cache>,
    memory: Mutex<HashMap<(String, String), Value>>,
}

impl ExternalDataCache {
    /// Cache for a site whose `cache/` and `output/` live under `root`.
    pub fn for_site(root: &Path, config: &Config) -> Self {
        let cache_dir = root.join("cache");
        let persistent = FileCache::new(cache_dir.clone(), Duration::from_secs(config.ttl));
        Self::new(
            cache_dir,
            root.join("output"),
            EnrichSettings::from_config(config),
            Arc::new(HttpFetcher::new(USER_AGENT)),
            Box::new(persistent),
        )
    }

    pub fn new(
        cache_dir: PathBuf,
        output_dir: PathBuf,
        settings: EnrichSettings,
        fetcher: Arc<dyn Fetcher>,
        persistent: Box<dyn Cache>,
    ) -> Self {
        Self {
            cache_dir,
            output_dir,
            settings,
            fetcher,
            persistent,
            memory: Mutex::new(HashMap::new()),
        }
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<(String, String), Value>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `fetch` unless `(operation, key)` is already cached.
    ///
    /// `namespace` selects the persistent bucket, usually the operation name.
    pub(crate) fn cached(
        &self,
        operation: &str,
        namespace: &str,
        key: &str,
        fetch: impl FnOnce() -> Result<Value, EnrichError>,
    ) -> Result<Value, EnrichError> {
        let memory_key = (operation.to_owned(), key.to_owned());
        if let Some(value) = self.memory().get(&memory_key) {
            tracing::debug!(operation, key, "memory cache hit");
            return Ok(value.clone());
        }

        let bucket = self.persistent.bucket(namespace);
        let digest = cache_key(key);
        if let Some(value) = bucket.get_json::<Value>(&digest) {
            tracing::debug!(operation, key, "persistent cache hit");
            self.memory().insert(memory_key, value.clone());
            return Ok(value);
        }

        let value = fetch()?;
        bucket.set_json(&digest, &value);
        self.memory().insert(memory_key, value.clone());
        Ok(value)
    }

    /// Fetch a URL body through the configured fetcher.
    pub(crate) fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, EnrichError> {
        tracing::info!(url, "fetching");
        self.fetcher.get(url, headers)
    }

    /// Fetch a URL and decode it as JSON.
    pub(crate) fn fetch_json(&self, url: &str) -> Result<Value, EnrichError> {
        let body = self.fetch(url, &[("Accept", "application/json")])?;
        serde_json::from_slice(&body).map_err(|e| EnrichError::Decode {
            resource: url.to_owned(),
            message: e.to_string(),
        })
    }
}

/// Stable digest of a cache key, used as the persistent file name.
pub(crate) fn cache_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::EnrichError;
    use crate::fetch::Fetcher;

    /// Fetcher serving canned responses and recording every request.
    #[derive(Default)]
    pub struct FakeFetcher {
        responses: Mutex<HashMap<String, Vec<u8>>>,
        pub requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl FakeFetcher {
        pub fn respond(&self, url: &str, body: impl Into<Vec<u8>>) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_owned(), body.into());
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn urls(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }
    }

    impl Fetcher for FakeFetcher {
        fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, EnrichError> {
            self.requests.lock().unwrap().push((
                url.to_owned(),
                headers
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect(),
            ));
            self.responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| EnrichError::HttpStatus {
                    url: url.to_owned(),
                    status: 404,
                    body: String::new(),
                })
        }
    }
}
