//! Splitting content files into metadata and body.
//!
//! A file may open with a fence: a run of three or more hyphens at the very
//! start. The frontmatter ends at the next occurrence of exactly the same run,
//! and everything after it is the body.

use crate::value::{MetaValue, Metadata};

/// Character a frontmatter fence is made of.
const FENCE_CHAR: char = '-';

/// Shortest run of [`FENCE_CHAR`] that opens frontmatter.
const MIN_FENCE_LEN: usize = 3;

/// Frontmatter could not be read as a YAML mapping.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("frontmatter is not a mapping")]
    NotAMapping,
}

/// Result of splitting a content file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContent {
    /// Page metadata with the page defaults merged underneath.
    pub metadata: Metadata,
    /// Trimmed body text.
    pub body: String,
}

/// Split `contents` into metadata and body.
///
/// Malformed frontmatter falls back to the default metadata and is reported
/// through the returned error so the caller can log it.
pub fn parse(contents: &str) -> (ParsedContent, Option<FrontmatterError>) {
    let Some((raw, body)) = split(contents) else {
        return (
            ParsedContent {
                metadata: Metadata::page_default(),
                body: contents.trim().to_owned(),
            },
            None,
        );
    };

    let mut metadata = Metadata::page_default();
    let error = match parse_mapping(raw) {
        Ok(parsed) => {
            metadata.merge(parsed);
            None
        }
        Err(e) => Some(e),
    };

    (
        ParsedContent {
            metadata,
            body: body.trim().to_owned(),
        },
        error,
    )
}

/// Locate the frontmatter block, returning `(frontmatter, body)`.
///
/// Returns `None` when there is no opening fence or it is never closed.
fn split(contents: &str) -> Option<(&str, &str)> {
    let fence_len = contents
        .chars()
        .take_while(|&c| c == FENCE_CHAR)
        .count();
    if fence_len < MIN_FENCE_LEN {
        return None;
    }
    let fence = &contents[..fence_len];
    let close = contents[fence_len..].find(fence)? + fence_len;
    Some((&contents[fence_len..close], &contents[close + fence_len..]))
}

fn parse_mapping(raw: &str) -> Result<Metadata, FrontmatterError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Metadata::new());
    }
    match serde_yaml::from_str::<serde_yaml::Value>(trimmed)? {
        serde_yaml::Value::Mapping(mapping) => Ok(Metadata::from_yaml_mapping(mapping)),
        serde_yaml::Value::Null => Ok(Metadata::new()),
        _ => Err(FrontmatterError::NotAMapping),
    }
}

/// Serialize metadata and body into file contents.
///
/// The body is trimmed; an empty body leaves nothing after the closing fence.
pub fn serialize(metadata: &Metadata, body: &str) -> Result<String, FrontmatterError> {
    let yaml = serde_yaml::to_string(&metadata.to_yaml_mapping())?;
    let fence: String = std::iter::repeat_n(FENCE_CHAR, MIN_FENCE_LEN).collect();
    let body = body.trim();
    if body.is_empty() {
        Ok(format!("{fence}\n{yaml}{fence}\n"))
    } else {
        Ok(format!("{fence}\n{yaml}{fence}\n{body}\n"))
    }
}

/// Template name from metadata. Numeric names such as `404` become strings.
pub fn template_name(metadata: &Metadata) -> String {
    metadata
        .get("template")
        .and_then(MetaValue::as_text)
        .unwrap_or_else(|| "index".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template(name: &str) -> Metadata {
        [("template", MetaValue::from(name))].into_iter().collect()
    }

    #[test]
    fn test_parse_metadata_and_body() {
        let (parsed, error) =
            parse("---\ntitle: The title\ntags:\n  - one\n  - two\n---\nThe body text.\n");
        assert!(error.is_none());
        assert_eq!(
            parsed.metadata.keys().collect::<Vec<_>>(),
            vec!["template", "title", "tags"]
        );
        assert_eq!(parsed.metadata.get("title"), Some(&"The title".into()));
        assert_eq!(parsed.body, "The body text.");
    }

    #[test]
    fn test_only_yaml_no_newline() {
        let (parsed, _) = parse("---\ntemplate: lorem\n---");
        assert_eq!(parsed.metadata, template("lorem"));
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_only_yaml_with_multiple_newlines() {
        let (parsed, _) = parse("---\ntemplate: lorem\n---\n\n");
        assert_eq!(parsed.metadata, template("lorem"));
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_four_hyphen_fence() {
        let (parsed, _) = parse("----\ntemplate: lorem\n----");
        assert_eq!(parsed.metadata, template("lorem"));
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_only_body() {
        let (parsed, _) = parse("lorem ipsum");
        assert_eq!(parsed.metadata, template("index"));
        assert_eq!(parsed.body, "lorem ipsum");

        let (parsed, _) = parse("\n\nlorem ipsum\n\n\n");
        assert_eq!(parsed.body, "lorem ipsum");
    }

    #[test]
    fn test_both_yaml_and_body() {
        let (parsed, _) = parse("---\ntemplate: lorem\n---\nIpsum.\n");
        assert_eq!(parsed.metadata, template("lorem"));
        assert_eq!(parsed.body, "Ipsum.");
    }

    #[test]
    fn test_unclosed_fence_is_all_body() {
        let (parsed, error) = parse("---\ntitle: never closed\n");
        assert!(error.is_none());
        assert_eq!(parsed.metadata, template("index"));
        assert_eq!(parsed.body, "---\ntitle: never closed");
    }

    #[test]
    fn test_close_fence_must_match_open_length() {
        // A four-hyphen fence is not closed by three hyphens.
        let (parsed, _) = parse("----\ntitle: x\n---\nbody");
        assert_eq!(parsed.metadata, template("index"));
        assert_eq!(parsed.body, "----\ntitle: x\n---\nbody");
    }

    #[test]
    fn test_two_hyphens_are_not_a_fence() {
        let (parsed, _) = parse("--\ntitle: x\n--\nbody");
        assert_eq!(parsed.metadata, template("index"));
    }

    #[test]
    fn test_invalid_yaml_falls_back_to_default() {
        let (parsed, error) = parse("---\ntitle: [unclosed\n---\nStill rendered.");
        assert!(matches!(error, Some(FrontmatterError::Yaml(_))));
        assert_eq!(parsed.metadata, template("index"));
        assert_eq!(parsed.body, "Still rendered.");
    }

    #[test]
    fn test_scalar_frontmatter_is_an_error() {
        let (parsed, error) = parse("---\njust a string\n---\nbody");
        assert!(matches!(error, Some(FrontmatterError::NotAMapping)));
        assert_eq!(parsed.metadata, template("index"));
    }

    #[test]
    fn test_empty_frontmatter() {
        let (parsed, error) = parse("---\n---\nbody");
        assert!(error.is_none());
        assert_eq!(parsed.metadata, template("index"));
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn test_numeric_template_name() {
        let (parsed, _) = parse("---\ntemplate: 404\n---\n");
        assert_eq!(template_name(&parsed.metadata), "404");
    }

    #[test]
    fn test_serialize_with_and_without_body() {
        let metadata = template("index");
        assert_eq!(
            serialize(&metadata, "  Body.\n\n").unwrap(),
            "---\ntemplate: index\n---\nBody.\n"
        );
        assert_eq!(serialize(&metadata, "").unwrap(), "---\ntemplate: index\n---\n");
    }

    #[test]
    fn test_serialize_then_parse_round_trips() {
        let mut metadata = Metadata::new();
        metadata.insert("title", "Round trip".into());
        metadata.insert("count", MetaValue::Int(3));
        metadata.insert(
            "tags",
            MetaValue::List(vec!["one".into(), "new tag".into()]),
        );
        metadata.insert("draft", MetaValue::Bool(false));
        metadata.insert("date", MetaValue::Date(crate::value::parse_timestamp("2020-01-01 02:03:04Z").unwrap()));

        let text = serialize(&metadata, "\nBody text.\n\n").unwrap();
        let (parsed, error) = parse(&text);
        assert!(error.is_none());

        let mut expected = Metadata::page_default();
        expected.merge(metadata);
        assert_eq!(parsed.metadata, expected);
        assert_eq!(parsed.body, "Body text.");
    }
}
