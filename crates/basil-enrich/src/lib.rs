//! Cached lookups of external data for basil templates.
//!
//! Every operation runs through [`ExternalDataCache`], which keeps results
//! in memory for the duration of a build and on disk under `cache/` across
//! builds. Supported sources:
//!
//! - Wikidata entities and SPARQL queries
//! - Wikimedia Commons file info and SPARQL queries
//! - Wikipedia article summaries
//! - Flickr photo metadata
//! - RSS feeds and arbitrary JSON or XML documents
//!
//! QR code images and remote files referenced from LaTeX output are
//! written to disk instead of returned as data.

mod cache;
mod documents;
mod download;
mod feeds;
pub mod fetch;
mod flickr;
mod qr;
mod wikimedia;
pub mod xml;

use std::path::PathBuf;

pub use cache::{EnrichSettings, ExternalDataCache};
pub use feeds::FeedItem;
pub use fetch::{Fetcher, HttpFetcher};
pub use xml::{XmlError, sparql_xml_rows, xml_to_value};

/// Enrichment errors.
///
/// Every variant names the resource that failed, so template authors can
/// tell which lookup broke their page.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("Request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Request to {url} returned HTTP {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unable to decode response from {resource}: {message}")]
    Decode { resource: String, message: String },

    #[error("{resource}")]
    NotFound { resource: String },

    #[error("{operation} requires `{field}` to be set. {hint}")]
    MissingCredential {
        field: &'static str,
        operation: &'static str,
        hint: &'static str,
    },

    #[error("Unable to download {url}")]
    Download { url: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to encode QR code for {text:?}: {message}")]
    QrCode { text: String, message: String },

    #[error("Invalid XML from {resource}: {source}")]
    Xml {
        resource: String,
        #[source]
        source: XmlError,
    },
}
