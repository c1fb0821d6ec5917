//! Wikidata, Wikimedia Commons and Wikipedia lookups.

use serde_json::{Map, Value};

use crate::EnrichError;
use crate::cache::ExternalDataCache;
use crate::fetch::{encode_segment, query_url};
use crate::xml::sparql_xml_rows;

const WIKIDATA_API: &str = "https://www.wikidata.org/w/api.php";
const COMMONS_API: &str = "https://commons.wikimedia.org/w/api.php";
const WIKIDATA_SPARQL: &str = "https://query.wikidata.org/bigdata/namespace/wdq/sparql";
const COMMONS_SPARQL: &str = "https://commons-query.wikimedia.org/sparql";

const COMMONS_TOKEN_HINT: &str = "You must set `commons.wcqs_auth_token` in the site's config file. \
     See https://w.wiki/9jke for how to retrieve the value for it.";

impl ExternalDataCache {
    /// Fetch a Wikidata entity by id, e.g. `Q42`.
    pub fn wikidata(&self, id: &str) -> Result<Value, EnrichError> {
        self.cached("wikidata", "wikidata", id, || {
            let url = query_url(
                WIKIDATA_API,
                &[("action", "wbgetentities"), ("ids", id), ("format", "json")],
            );
            let mut response = self.fetch_json(&url)?;
            match response.pointer_mut(&format!("/entities/{id}")) {
                Some(entity) if entity.get("missing").is_none() => Ok(entity.take()),
                _ => Err(EnrichError::NotFound {
                    resource: format!("Wikidata entity does not exist: {id}"),
                }),
            }
        })
    }

    /// Fetch image info and structured data for a Commons file.
    ///
    /// `name` is the file name without the `File:` prefix. The result is the
    /// image info object with the MediaInfo entity merged over it.
    pub fn commons(&self, name: &str) -> Result<Value, EnrichError> {
        self.cached("commons", "commons", name, || {
            let title = format!("File:{name}");
            let width = self.settings.embed_width.to_string();
            let url = query_url(
                COMMONS_API,
                &[
                    ("action", "query"),
                    ("prop", "imageinfo"),
                    ("iiprop", "url"),
                    ("iiurlwidth", &width),
                    ("titles", &title),
                    ("redirects", "1"),
                    ("format", "json"),
                ],
            );
            let not_found = || EnrichError::NotFound {
                resource: format!("Commons file does not exist: {name}"),
            };

            let response = self.fetch_json(&url)?;
            let file_info = response
                .pointer("/query/pages")
                .and_then(Value::as_object)
                .and_then(|pages| pages.values().next())
                .and_then(Value::as_object)
                .ok_or_else(not_found)?;
            let page_id = file_info
                .get("pageid")
                .and_then(Value::as_i64)
                .ok_or_else(not_found)?;

            let media_id = format!("M{page_id}");
            let url = query_url(
                COMMONS_API,
                &[("action", "wbgetentities"), ("ids", &media_id), ("format", "json")],
            );
            let response = self.fetch_json(&url)?;
            let media_info = response
                .get("entities")
                .and_then(Value::as_object)
                .and_then(|entities| entities.values().next())
                .and_then(Value::as_object)
                .ok_or_else(not_found)?;

            let mut merged = file_info.clone();
            merged.extend(media_info.clone());
            Ok(Value::Object(merged))
        })
    }

    /// Lead section of a Wikipedia article as HTML.
    pub fn wikipedia(&self, lang: &str, title: &str) -> Result<String, EnrichError> {
        let url = format!(
            "https://{lang}.wikipedia.org/api/rest_v1/page/summary/{}",
            encode_segment(&title.replace(' ', "_"))
        );
        let summary = self.get_json(&url)?;
        summary
            .get("extract_html")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| EnrichError::NotFound {
                resource: format!("Unable to get extract of Wikipedia article: {title}"),
            })
    }

    /// Run a SPARQL query against the Wikidata query service.
    pub fn wikidata_query(&self, query: &str) -> Result<Vec<Map<String, Value>>, EnrichError> {
        let rows = self.cached("wikidata_query", "wikidata_query", query, || {
            let url = query_url(WIKIDATA_SPARQL, &[("query", query)]);
            let body = self.fetch(&url, &[("Accept", "application/sparql-results+xml")])?;
            let xml = String::from_utf8_lossy(&body);
            let rows = sparql_xml_rows(&xml).map_err(|source| EnrichError::Xml {
                resource: url.clone(),
                source,
            })?;
            Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
        })?;
        Ok(into_rows(rows))
    }

    /// Run a SPARQL query against the Commons query service.
    ///
    /// The service requires an OAuth cookie, taken from
    /// `commons.wcqs_auth_token`.
    pub fn commons_query(&self, query: &str) -> Result<Vec<Map<String, Value>>, EnrichError> {
        let token = self
            .settings
            .commons_token
            .as_deref()
            .ok_or(EnrichError::MissingCredential {
                field: "commons.wcqs_auth_token",
                operation: "commons_query",
                hint: COMMONS_TOKEN_HINT,
            })?;

        let rows = self.cached("commons_query", "commons_query", query, || {
            let url = query_url(COMMONS_SPARQL, &[("format", "json"), ("query", query)]);
            let cookie = format!("wcqsOauth={token}");
            let body = self.fetch(
                &url,
                &[("Accept", "application/sparql-results+json"), ("Cookie", &cookie)],
            )?;
            let response: Value =
                serde_json::from_slice(&body).map_err(|e| EnrichError::Decode {
                    resource: url.clone(),
                    message: e.to_string(),
                })?;
            let bindings = response
                .pointer("/results/bindings")
                .and_then(Value::as_array)
                .ok_or_else(|| EnrichError::Decode {
                    resource: url.clone(),
                    message: "missing results.bindings".to_owned(),
                })?;
            Ok(Value::Array(bindings.iter().map(flatten_binding).collect()))
        })?;
        Ok(into_rows(rows))
    }
}

/// `{var: {type, value}}` to `{var: value}`.
fn flatten_binding(binding: &Value) -> Value {
    let row: Map<String, Value> = binding
        .as_object()
        .into_iter()
        .flatten()
        .map(|(name, cell)| {
            let value = cell.get("value").cloned().unwrap_or(Value::Null);
            (name.clone(), value)
        })
        .collect();
    Value::Object(row)
}

fn into_rows(value: Value) -> Vec<Map<String, Value>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
