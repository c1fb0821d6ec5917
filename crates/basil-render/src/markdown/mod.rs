//! Markdown conversion with embeds.
//!
//! A line of markdown matching one of the site's `embeds` patterns is not
//! converted; it is replaced by the rendered `embeds/<name>` template in the
//! target format. Everything between embeds is converted normally.

pub(crate) mod html;
pub(crate) mod latex;

use minijinja::Error;
use pulldown_cmark::Options;
use regex::Regex;
use serde::Serialize;

/// An embed found in markdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    /// Name of the matching pattern, and of the `embeds/` template.
    pub name: String,
    /// The whole line, trimmed.
    pub url: String,
    /// Capture groups of the pattern; index 0 is the whole match.
    pub matches: Vec<String>,
}

/// Something that recognises embed lines and renders them.
pub(crate) trait Embeddable {
    /// Named patterns, checked in order.
    fn patterns(&self) -> &[(String, Regex)];

    /// Render an embed in this converter's output format.
    fn render(&self, embed: &Embed) -> Result<String, Error>;

    /// Whether `line` starts an embed.
    fn identify(&self, line: &str) -> bool {
        let line = line.trim();
        !line.is_empty() && self.patterns().iter().any(|(_, re)| re.is_match(line))
    }

    /// The embed at `lines[pos]`, if any.
    fn consume(&self, lines: &[&str], pos: usize) -> Option<Embed> {
        let line = lines.get(pos)?.trim();
        self.patterns().iter().find_map(|(name, re)| {
            let captures = re.captures(line)?;
            Some(Embed {
                name: name.clone(),
                url: line.to_owned(),
                matches: captures
                    .iter()
                    .map(|m| m.map_or_else(String::new, |m| m.as_str().to_owned()))
                    .collect(),
            })
        })
    }
}

/// A run of markdown or a single embed.
#[derive(Debug, PartialEq)]
pub(crate) enum Segment {
    Markdown(String),
    Embed(Embed),
}

/// Split markdown at embed lines. Lines inside fenced code are never embeds.
pub(crate) fn split_embeds(markdown: &str, embeds: &dyn Embeddable) -> Vec<Segment> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut segments = Vec::new();
    let mut chunk = String::new();
    let mut fence: Option<&str> = None;

    for (pos, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if let Some(open) = fence {
            if trimmed.starts_with(open) {
                fence = None;
            }
        } else if trimmed.starts_with("```") {
            fence = Some("```");
        } else if trimmed.starts_with("~~~") {
            fence = Some("~~~");
        } else if embeds.identify(line)
            && let Some(embed) = embeds.consume(&lines, pos)
        {
            if !chunk.trim().is_empty() {
                segments.push(Segment::Markdown(std::mem::take(&mut chunk)));
            }
            chunk.clear();
            segments.push(Segment::Embed(embed));
            continue;
        }
        chunk.push_str(line);
        chunk.push('\n');
    }
    if !chunk.trim().is_empty() {
        segments.push(Segment::Markdown(chunk));
    }
    segments
}

/// Parser options shared by both converters.
pub(crate) fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Renders embeds as `[name:url]`.
    pub struct FakeEmbeds(pub Vec<(String, Regex)>);

    impl FakeEmbeds {
        pub fn video() -> Self {
            Self(vec![(
                "video".to_owned(),
                Regex::new(r"^https://video\.test/watch\?v=(\w+)$").unwrap(),
            )])
        }
    }

    impl Embeddable for FakeEmbeds {
        fn patterns(&self) -> &[(String, Regex)] {
            &self.0
        }

        fn render(&self, embed: &Embed) -> Result<String, Error> {
            Ok(format!("[{}:{}]", embed.name, embed.matches[1]))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::testing::FakeEmbeds;
    use super::*;

    #[test]
    fn test_split_embeds() {
        let markdown = "Intro\n\nhttps://video.test/watch?v=abc\n\nOutro\n";
        let segments = split_embeds(markdown, &FakeEmbeds::video());

        assert_eq!(
            segments,
            vec![
                Segment::Markdown("Intro\n\n".to_owned()),
                Segment::Embed(Embed {
                    name: "video".to_owned(),
                    url: "https://video.test/watch?v=abc".to_owned(),
                    matches: vec!["https://video.test/watch?v=abc".to_owned(), "abc".to_owned()],
                }),
                Segment::Markdown("\nOutro\n".to_owned()),
            ]
        );
    }

    #[test]
    fn test_no_embeds_in_code_fences() {
        let markdown = "```\nhttps://video.test/watch?v=abc\n```\n";
        let segments = split_embeds(markdown, &FakeEmbeds::video());

        assert_eq!(segments, vec![Segment::Markdown(markdown.to_owned())]);
    }

    #[test]
    fn test_inline_url_is_not_an_embed() {
        let markdown = "See https://video.test/watch?v=abc for more.\n";
        let segments = split_embeds(markdown, &FakeEmbeds::video());

        assert_eq!(segments, vec![Segment::Markdown(markdown.to_owned())]);
    }
}
