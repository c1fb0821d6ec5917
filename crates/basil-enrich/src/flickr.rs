//! Flickr photo metadata.

use serde_json::{Map, Value, json};

use crate::EnrichError;
use crate::cache::ExternalDataCache;
use crate::fetch::query_url;

const FLICKR_REST: &str = "https://api.flickr.com/services/rest/";

/// Bumped whenever the shape of cached photo info changes.
const CACHE_VERSION: u32 = 2;

/// Alphabet of flic.kr short links.
const BASE58_ALPHABET: &[u8] = b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

impl ExternalDataCache {
    /// Photo info with computed URLs and license details.
    ///
    /// The result has `id`, `title`, `description`, `urls` (`photopage`,
    /// `short`, `medium_image`), `dates`, `owner` and `license`.
    pub fn flickr(&self, photo_id: &str) -> Result<Value, EnrichError> {
        let key = format!("v{CACHE_VERSION}:{photo_id}");
        self.cached("flickr", "flickr", &key, || {
            let short_url = short_url(photo_id);
            tracing::info!(photo_id, short_url, "Flickr fetch info");

            let info = self.flickr_call("flickr.photos.getInfo", &[("photo_id", photo_id)])?;
            let photo = info.get("photo").cloned().ok_or_else(|| EnrichError::NotFound {
                resource: format!("Flickr photo does not exist: {photo_id}"),
            })?;
            let licenses = self.flickr_licenses()?;

            let field = |name: &str| photo.get(name).cloned().unwrap_or(Value::Null);
            let text = |name: &str| photo.get(name).map(value_text).unwrap_or_default();
            let photopage = photo
                .pointer("/urls/url/0/_content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let medium_image = format!(
                "https://farm{}.staticflickr.com/{}/{}_{}_c.jpg",
                text("farm"),
                text("server"),
                text("id"),
                text("secret"),
            );
            let license = licenses.get(&text("license")).cloned().unwrap_or(Value::Null);

            Ok(json!({
                "id": field("id"),
                "title": field("title"),
                "description": field("description"),
                "urls": {
                    "photopage": photopage,
                    "short": short_url,
                    "medium_image": medium_image,
                },
                "dates": field("dates"),
                "owner": field("owner"),
                "license": license,
            }))
        })
    }

    /// Licenses keyed by license id.
    fn flickr_licenses(&self) -> Result<Map<String, Value>, EnrichError> {
        let licenses = self.cached("flickr_licenses", "flickr", "licenses", || {
            let response = self.flickr_call("flickr.photos.licenses.getInfo", &[])?;
            let by_id: Map<String, Value> = response
                .pointer("/licenses/license")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|license| {
                    let id = license.get("id").map(value_text)?;
                    Some((id, license.clone()))
                })
                .collect();
            Ok(Value::Object(by_id))
        })?;
        match licenses {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    fn flickr_call(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, EnrichError> {
        let api_key = self
            .settings
            .flickr_api_key
            .as_deref()
            .ok_or(EnrichError::MissingCredential {
                field: "flickr.api_key",
                operation: "flickr",
                hint: "Add a [flickr] section with api_key and api_secret to the site's config file.",
            })?;

        let mut query = vec![("method", method), ("api_key", api_key)];
        query.extend_from_slice(params);
        query.extend([("format", "json"), ("nojsoncallback", "1")]);
        let url = query_url(FLICKR_REST, &query);

        let response = clean_text_nodes(self.fetch_json(&url)?);
        if response.get("stat").and_then(Value::as_str) == Some("fail") {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            let subject = params.first().map_or(method, |(_, value)| *value);
            return Err(EnrichError::NotFound {
                resource: format!("Flickr {method} failed for {subject}: {message}"),
            });
        }
        Ok(response)
    }
}

/// flic.kr short link for a numeric photo id.
pub(crate) fn short_url(photo_id: &str) -> String {
    let mut num: u64 = photo_id.parse().unwrap_or_default();
    let mut encoded = Vec::new();
    while num >= 58 {
        encoded.push(BASE58_ALPHABET[(num % 58) as usize]);
        num /= 58;
    }
    if num > 0 {
        encoded.push(BASE58_ALPHABET[num as usize]);
    }
    encoded.reverse();
    format!("https://flic.kr/p/{}", String::from_utf8_lossy(&encoded))
}

/// Replace `{"_content": x}` objects with `x`, recursively.
fn clean_text_nodes(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            if map.len() == 1 && map.contains_key("_content") {
                return map.remove("_content").unwrap_or(Value::Null);
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, clean_text_nodes(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(clean_text_nodes).collect()),
        other => other,
    }
}

/// Scalar as text, without JSON quoting.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
