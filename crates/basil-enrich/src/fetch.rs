//! HTTP access for enrichment operations.
//!
//! Operations never talk to the network directly; they go through a
//! [`Fetcher`], so a build can be wired to a real HTTP agent and tests to a
//! recording fake.

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use ureq::Agent;

use crate::EnrichError;

/// Default limit in seconds on a whole request, from connect to last body byte.
const DEFAULT_TIMEOUT: u64 = 60;

/// Largest response body accepted, for downloads of page assets.
const MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

/// Characters left unescaped in query values (RFC 3986 unreserved).
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Performs HTTP GET requests.
pub trait Fetcher: Send + Sync {
    /// Fetch `url` with extra request headers and return the response body.
    ///
    /// Responses with a status of 400 or above are errors.
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, EnrichError>;
}

/// [`Fetcher`] backed by a `ureq` agent.
pub struct HttpFetcher {
    agent: Agent,
    user_agent: String,
}

impl HttpFetcher {
    /// Create a fetcher whose requests fail after 60 seconds.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self::with_timeout(user_agent, Duration::from_secs(DEFAULT_TIMEOUT))
    }

    /// Create a fetcher with a custom request timeout. A request that runs
    /// past it fails with [`EnrichError::Http`] naming the URL.
    pub fn with_timeout(user_agent: impl Into<String>, timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            user_agent: user_agent.into(),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, EnrichError> {
        let mut request = self.agent.get(url).header("User-Agent", &self.user_agent);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.call().map_err(|e| EnrichError::Http {
            url: url.to_owned(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let mut body = response.into_body();

        if status >= 400 {
            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            return Err(EnrichError::HttpStatus {
                url: url.to_owned(),
                status,
                body: error_body,
            });
        }

        body.with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(|e| EnrichError::Http {
                url: url.to_owned(),
                message: e.to_string(),
            })
    }
}

/// Append percent-encoded query parameters to `base`.
pub(crate) fn query_url(base: &str, params: &[(&str, &str)]) -> String {
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, QUERY_VALUE),
                utf8_percent_encode(v, QUERY_VALUE)
            )
        })
        .collect();
    if query.is_empty() {
        base.to_owned()
    } else {
        format!("{base}?{}", query.join("&"))
    }
}

/// Percent-encode a single path segment.
pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, QUERY_VALUE).to_string()
}

/// Host part of a URL, or an empty string when there is none.
pub(crate) fn url_host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    host.split(':').next().unwrap_or_default()
}

/// Extension of the last path segment of a URL, without query or fragment.
pub(crate) fn url_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.split_once("://").map_or(path, |(_, rest)| {
        rest.find('/').map_or("", |i| &rest[i..])
    });
    let file = path.rsplit('/').next().unwrap_or_default();
    file.rsplit_once('.').map_or("", |(_, ext)| ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stalled_request_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/slow.json", listener.local_addr().unwrap());
        let fetcher = HttpFetcher::with_timeout("basil-test", Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = fetcher.get(&url, &[]).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, EnrichError::Http { .. }), "{err}");
        assert!(err.to_string().contains(&url), "{err}");
        drop(listener);
    }

    #[test]
    fn test_query_url_encodes_values() {
        assert_eq!(
            query_url(
                "https://www.wikidata.org/w/api.php",
                &[("action", "wbgetentities"), ("titles", "File:A b&c.jpg")]
            ),
            "https://www.wikidata.org/w/api.php?action=wbgetentities&titles=File%3AA%20b%26c.jpg"
        );
        assert_eq!(query_url("https://x.test/", &[]), "https://x.test/");
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://example.org/a/b.json"), "example.org");
        assert_eq!(url_host("http://user@example.org:8080?x=1"), "example.org");
        assert_eq!(url_host("not a url"), "not a url");
        assert_eq!(url_host(""), "");
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://example.org/img/photo.JPG?size=2"), "JPG");
        assert_eq!(url_extension("https://example.org/a.b/file"), "");
        assert_eq!(url_extension("https://example.org"), "");
        assert_eq!(url_extension("https://example.org/archive.tar.gz#x"), "gz");
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("Douglas_Adams"), "Douglas_Adams");
        assert_eq!(encode_segment("C++ (lang)"), "C%2B%2B%20%28lang%29");
    }
}
