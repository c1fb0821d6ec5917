//! Markdown to HTML.

use basil_content::Page;
use minijinja::Error;
use pulldown_cmark::{Event, Parser, Tag, html};

use super::{Embeddable, Segment, parser_options, split_embeds};

/// Convert markdown to HTML.
///
/// Relative image URLs are site-root paths and are rewritten relative to
/// `page`.
pub(crate) fn to_html(markdown: &str, page: &Page, embeds: &dyn Embeddable) -> Result<String, Error> {
    let mut out = String::new();
    for segment in split_embeds(markdown, embeds) {
        match segment {
            Segment::Markdown(text) => push_markdown(&mut out, &text, page),
            Segment::Embed(embed) => {
                out.push_str(&embeds.render(&embed)?);
                out.push('\n');
            }
        }
    }
    Ok(out)
}

fn push_markdown(out: &mut String, markdown: &str, page: &Page) {
    let events = Parser::new_ext(markdown, parser_options()).map(|event| match event {
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) if !dest_url.starts_with("http") => Event::Start(Tag::Image {
            link_type,
            dest_url: page.link(&dest_url).into(),
            title,
            id,
        }),
        other => other,
    });
    html::push_html(out, events);
}
