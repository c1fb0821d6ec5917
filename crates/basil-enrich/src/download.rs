//! Remote files referenced from LaTeX output.

use std::fs;

use md5::{Digest, Md5};

use crate::EnrichError;
use crate::cache::ExternalDataCache;
use crate::fetch::url_extension;
use crate::qr::create_parent;

impl ExternalDataCache {
    /// Download `url` next to the LaTeX sources and return its path relative
    /// to the `.tex` file of `page_id`.
    ///
    /// Files land in `cache/tex/_urls/<md5 of url>.<ext>` and are fetched only
    /// when missing or empty.
    pub fn tex_url(&self, url: &str, page_id: &str) -> Result<String, EnrichError> {
        let digest = hex::encode(Md5::digest(url.as_bytes()));
        let filename = match url_extension(url) {
            "" => digest,
            ext => format!("{digest}.{ext}"),
        };
        let path = self.cache_dir.join("tex").join("_urls").join(&filename);

        let present = fs::metadata(&path).is_ok_and(|m| m.len() > 0);
        if !present {
            tracing::info!(url, "TeX file download");
            create_parent(&path)?;
            let body = self.fetch(url, &[]).map_err(|e| {
                tracing::warn!(url, error = %e, "download failed");
                EnrichError::Download {
                    url: url.to_owned(),
                }
            })?;
            if body.is_empty() {
                let _ = fs::remove_file(&path);
                return Err(EnrichError::Download {
                    url: url.to_owned(),
                });
            }
            if let Err(source) = fs::write(&path, &body) {
                let _ = fs::remove_file(&path);
                return Err(EnrichError::Io { path, source });
            }
        }

        let depth = page_id.split('/').count().saturating_sub(2);
        Ok(format!("{}_urls/{filename}", "../".repeat(depth)))
    }
}
