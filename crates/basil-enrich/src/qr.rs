//! QR code images written to the output tree.

use std::fs;
use std::path::Path;

use md5::{Digest, Md5};
use qrcode::QrCode;
use qrcode::render::svg;

use crate::EnrichError;
use crate::cache::ExternalDataCache;

impl ExternalDataCache {
    /// Site-absolute path of an SVG QR code encoding `text`.
    ///
    /// The file is `/qrcodes/<md5 of text>.svg` under the output directory.
    /// A copy kept in `cache/qrcodes/` is reused across builds, so a code is
    /// generated at most once.
    pub fn qrcode(&self, text: &str) -> Result<String, EnrichError> {
        let filename = format!("{}.svg", hex::encode(Md5::digest(text.as_bytes())));
        let asset_path = format!("/qrcodes/{filename}");
        let output_path = self.output_dir.join("qrcodes").join(&filename);
        let cache_path = self.cache_dir.join("qrcodes").join(&filename);

        if output_path.exists() {
            return Ok(asset_path);
        }
        create_parent(&output_path)?;
        create_parent(&cache_path)?;

        if !cache_path.exists() {
            tracing::info!(text, path = %cache_path.display(), "generating QR code");
            let code = QrCode::new(text.as_bytes()).map_err(|e| EnrichError::QrCode {
                text: text.to_owned(),
                message: e.to_string(),
            })?;
            let image = code.render::<svg::Color<'_>>().build();
            fs::write(&cache_path, image).map_err(|source| EnrichError::Io {
                path: cache_path.clone(),
                source,
            })?;
        }

        fs::copy(&cache_path, &output_path).map_err(|source| EnrichError::Io {
            path: output_path.clone(),
            source,
        })?;
        Ok(asset_path)
    }
}

pub(crate) fn create_parent(path: &Path) -> Result<(), EnrichError> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|source| EnrichError::Io {
            path: parent.to_path_buf(),
            source,
        }),
        None => Ok(()),
    }
}
