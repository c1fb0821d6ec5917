//! Generic JSON and XML documents fetched by URL.

use serde_json::Value;

use crate::EnrichError;
use crate::cache::ExternalDataCache;
use crate::fetch::url_host;
use crate::xml::xml_to_value;

impl ExternalDataCache {
    /// Fetch and decode a JSON document.
    ///
    /// Empty documents (`null`, `false`, `""`, `[]`, `{}`) are errors.
    pub fn get_json(&self, url: &str) -> Result<Value, EnrichError> {
        let namespace = format!("json_{}", url_host(url));
        self.cached("get_json", &namespace, url, || {
            tracing::info!(url, "Get JSON");
            let value = self.fetch_json(url)?;
            if is_empty(&value) {
                return Err(EnrichError::Decode {
                    resource: url.to_owned(),
                    message: "empty JSON document".to_owned(),
                });
            }
            Ok(value)
        })
    }

    /// Fetch an XML document and decode it into nested maps.
    ///
    /// Attributes appear under `_attributes`, so they never collide with
    /// child elements of the same name.
    pub fn get_xml(&self, url: &str) -> Result<Value, EnrichError> {
        let namespace = format!("xml_{}", url_host(url));
        self.cached("get_xml", &namespace, url, || {
            tracing::info!(url, "Get XML");
            let body = self.fetch(url, &[("Accept", "application/xml, text/xml")])?;
            let text = String::from_utf8_lossy(&body);
            xml_to_value(&text).map_err(|source| EnrichError::Xml {
                resource: url.to_owned(),
                source,
            })
        })
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(true) => false,
    }
}
