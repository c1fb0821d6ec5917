//! RSS and Atom feed aggregation.

use std::io::Cursor;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::EnrichError;
use crate::cache::ExternalDataCache;

/// One item of an aggregated feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub guid: Option<String>,
    /// Publication date as RFC 3339, when the feed gives a parseable one.
    pub date: Option<String>,
    /// Unix timestamp of `date`, used for ordering.
    pub timestamp: Option<i64>,
    pub feed_title: String,
    pub feed_link: String,
}

impl ExternalDataCache {
    /// Items of all `urls`, newest first. Undated items come last.
    pub fn get_feeds(&self, urls: &[String]) -> Result<Vec<FeedItem>, EnrichError> {
        let mut items = Vec::new();
        for url in urls {
            let value = self.cached("get_feeds", "feeds", url, || {
                let body = self.fetch(
                    url,
                    &[(
                        "Accept",
                        "application/rss+xml, application/atom+xml, application/xml, text/xml",
                    )],
                )?;
                let parsed = parse_feed(url, &body)?;
                serde_json::to_value(parsed).map_err(|e| EnrichError::Decode {
                    resource: url.clone(),
                    message: e.to_string(),
                })
            })?;
            let feed: Vec<FeedItem> =
                serde_json::from_value(value).map_err(|e| EnrichError::Decode {
                    resource: url.clone(),
                    message: e.to_string(),
                })?;
            items.extend(feed);
        }
        items.sort_by(|a, b| match (a.timestamp, b.timestamp) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(items)
    }
}

/// Parse an RSS 2.0 channel, falling back to an Atom feed.
fn parse_feed(url: &str, body: &[u8]) -> Result<Vec<FeedItem>, EnrichError> {
    match rss::Channel::read_from(Cursor::new(body)) {
        Ok(channel) => Ok(rss_items(&channel)),
        Err(rss_error) => atom_syndication::Feed::read_from(Cursor::new(body))
            .map(|feed| atom_items(&feed))
            .map_err(|_| EnrichError::Decode {
                resource: url.to_owned(),
                message: rss_error.to_string(),
            }),
    }
}

fn rss_items(channel: &rss::Channel) -> Vec<FeedItem> {
    channel
        .items()
        .iter()
        .map(|item| {
            let date = item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok());
            FeedItem {
                title: item.title().map(str::to_owned),
                link: item.link().map(str::to_owned),
                description: item.description().map(str::to_owned),
                author: item.author().map(str::to_owned),
                guid: item.guid().map(|g| g.value().to_owned()),
                date: date.map(|d| d.to_rfc3339()),
                timestamp: date.map(|d| d.timestamp()),
                feed_title: channel.title().to_owned(),
                feed_link: channel.link().to_owned(),
            }
        })
        .collect()
}

fn atom_items(feed: &atom_syndication::Feed) -> Vec<FeedItem> {
    let feed_link = alternate_link(feed.links()).unwrap_or_default();
    feed.entries()
        .iter()
        .map(|entry| {
            let date: DateTime<FixedOffset> =
                entry.published().copied().unwrap_or(*entry.updated());
            let description = entry
                .summary()
                .map(|summary| summary.value.clone())
                .or_else(|| entry.content().and_then(|c| c.value().map(str::to_owned)));
            FeedItem {
                title: Some(entry.title().value.clone()),
                link: alternate_link(entry.links()),
                description,
                author: entry.authors().first().map(|a| a.name().to_owned()),
                guid: Some(entry.id().to_owned()),
                date: Some(date.to_rfc3339()),
                timestamp: Some(date.timestamp()),
                feed_title: feed.title().value.clone(),
                feed_link: feed_link.clone(),
            }
        })
        .collect()
}

/// The `alternate` link, else the first link.
fn alternate_link(links: &[atom_syndication::Link]) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel() == "alternate")
        .or_else(|| links.first())
        .map(|link| link.href().to_owned())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use basil_cache::NullCache;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cache::EnrichSettings;
    use crate::cache::testing::FakeFetcher;
    use crate::fetch::Fetcher;

    fn feed(title: &str, items: &[(&str, Option<&str>)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, date)| {
                let date = date
                    .map(|d| format!("<pubDate>{d}</pubDate>"))
                    .unwrap_or_default();
                format!("<item><title>{title}</title>{date}</item>")
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{title}</title>
            <link>https://{title}.test/</link><description>d</description>{items}</channel></rss>"#
        )
    }

    #[test]
    fn test_get_feeds_merges_newest_first() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.respond(
            "https://a.test/feed",
            feed(
                "a",
                &[
                    ("a1", Some("Mon, 01 Jan 2024 10:00:00 +0000")),
                    ("a2", None),
                ],
            ),
        );
        fetcher.respond(
            "https://b.test/feed",
            feed("b", &[("b1", Some("Tue, 02 Jan 2024 10:00:00 +0000"))]),
        );
        let data = ExternalDataCache::new(
            PathBuf::from("/nonexistent/cache"),
            PathBuf::from("/nonexistent/output"),
            EnrichSettings::default(),
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Box::new(NullCache),
        );
        let urls = vec![
            "https://a.test/feed".to_owned(),
            "https://b.test/feed".to_owned(),
        ];

        let items = data.get_feeds(&urls).unwrap();
        let titles: Vec<_> = items.iter().filter_map(|i| i.title.as_deref()).collect();
        assert_eq!(titles, vec!["b1", "a1", "a2"]);
        assert_eq!(items[0].feed_title, "b");
        assert_eq!(items[0].date.as_deref(), Some("2024-01-02T10:00:00+00:00"));

        data.get_feeds(&urls).unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_atom_feed() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.respond(
            "https://c.test/atom.xml",
            r#"<?xml version="1.0" encoding="utf-8"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
              <title>Herb garden</title>
              <id>urn:uuid:60a76c80-d399-11d9-b93c-0003939e0af6</id>
              <updated>2024-01-03T09:00:00Z</updated>
              <link rel="self" href="https://c.test/atom.xml"/>
              <link rel="alternate" href="https://c.test/"/>
              <entry>
                <title>Pinching out</title>
                <id>https://c.test/pinching</id>
                <link href="https://c.test/pinching"/>
                <updated>2024-01-03T09:00:00Z</updated>
                <published>2024-01-01T08:00:00+01:00</published>
                <author><name>Ocimum</name></author>
                <summary>Keep it bushy.</summary>
              </entry>
              <entry>
                <title>Watering</title>
                <id>https://c.test/watering</id>
                <updated>2024-01-02T12:00:00Z</updated>
                <content type="html">Little and often.</content>
              </entry>
            </feed>"#,
        );
        fetcher.respond(
            "https://a.test/feed",
            feed("a", &[("a1", Some("Tue, 02 Jan 2024 10:00:00 +0000"))]),
        );
        let data = ExternalDataCache::new(
            PathBuf::from("/nonexistent/cache"),
            PathBuf::from("/nonexistent/output"),
            EnrichSettings::default(),
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Box::new(NullCache),
        );

        let items = data
            .get_feeds(&["https://c.test/atom.xml".to_owned(), "https://a.test/feed".to_owned()])
            .unwrap();
        let titles: Vec<_> = items.iter().filter_map(|i| i.title.as_deref()).collect();
        assert_eq!(titles, vec!["Watering", "a1", "Pinching out"]);

        let pinching = &items[2];
        assert_eq!(pinching.link.as_deref(), Some("https://c.test/pinching"));
        assert_eq!(pinching.author.as_deref(), Some("Ocimum"));
        assert_eq!(pinching.description.as_deref(), Some("Keep it bushy."));
        assert_eq!(pinching.date.as_deref(), Some("2024-01-01T08:00:00+01:00"));
        assert_eq!(pinching.feed_title, "Herb garden");
        assert_eq!(pinching.feed_link, "https://c.test/");
        assert_eq!(items[0].description.as_deref(), Some("Little and often."));
        assert_eq!(items[0].guid.as_deref(), Some("https://c.test/watering"));
    }

    #[test]
    fn test_invalid_feed_names_url() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.respond("https://bad.test/feed", "<html></html>");
        let data = ExternalDataCache::new(
            PathBuf::from("/nonexistent/cache"),
            PathBuf::from("/nonexistent/output"),
            EnrichSettings::default(),
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Box::new(NullCache),
        );

        let err = data
            .get_feeds(&["https://bad.test/feed".to_owned()])
            .unwrap_err();
        assert!(err.to_string().contains("https://bad.test/feed"));
    }
}
