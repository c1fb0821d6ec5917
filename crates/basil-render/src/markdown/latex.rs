//! Markdown to LaTeX.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path};

use minijinja::Error;
use pulldown_cmark::{Alignment, Event, HeadingLevel, Parser, Tag, TagEnd};

use super::{Embeddable, Segment, parser_options, split_embeds};
use crate::RenderError;

/// Marker around footnote labels until definitions are known.
const FOOTNOTE_MARK: char = '\u{1}';

/// Convert markdown to LaTeX.
///
/// `image` maps each image URL to the path written in `\includegraphics`.
pub(crate) fn to_latex(
    markdown: &str,
    embeds: &dyn Embeddable,
    image: &mut dyn FnMut(&str) -> Result<String, Error>,
) -> Result<String, Error> {
    let mut out = String::new();
    for segment in split_embeds(markdown, embeds) {
        match segment {
            Segment::Markdown(text) => {
                let mut writer = LatexWriter::default();
                for event in Parser::new_ext(&text, parser_options()) {
                    writer.event(event, image)?;
                }
                out.push_str(&writer.finish());
            }
            Segment::Embed(embed) => {
                out.push_str(&embeds.render(&embed)?);
                out.push_str("\n\n");
            }
        }
    }
    Ok(out)
}

/// Escape plain text for LaTeX.
pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str(r"\textbackslash{}"),
            '{' => out.push_str(r"\{"),
            '}' => out.push_str(r"\}"),
            '$' => out.push_str(r"\$"),
            '&' => out.push_str(r"\&"),
            '#' => out.push_str(r"\#"),
            '%' => out.push_str(r"\%"),
            '_' => out.push_str(r"\_"),
            '^' => out.push_str(r"\textasciicircum{}"),
            '~' => out.push_str(r"\textasciitilde{}"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_url(url: &str) -> String {
    url.replace('\\', "/")
        .replace('%', r"\%")
        .replace('#', r"\#")
}

#[derive(Default)]
struct LatexWriter {
    /// Output buffers; footnote definitions render into their own.
    buffers: Vec<String>,
    footnotes: HashMap<String, String>,
    /// Labels referenced, in order.
    footnote_labels: Vec<String>,
    /// Labels of open footnote definitions.
    open_definitions: Vec<String>,
    in_code_block: bool,
    image_depth: usize,
    cell_index: usize,
}

impl LatexWriter {
    fn out(&mut self) -> &mut String {
        if self.buffers.is_empty() {
            self.buffers.push(String::new());
        }
        let last = self.buffers.len() - 1;
        &mut self.buffers[last]
    }

    fn push(&mut self, text: &str) {
        if self.image_depth == 0 {
            self.out().push_str(text);
        }
    }

    fn event(
        &mut self,
        event: Event<'_>,
        image: &mut dyn FnMut(&str) -> Result<String, Error>,
    ) -> Result<(), Error> {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => {
                let path = image(&dest_url)?;
                self.push(&format!(r"\includegraphics{{{}}}", escape_url(&path)));
                self.image_depth += 1;
            }
            Event::End(TagEnd::Image) => self.image_depth = self.image_depth.saturating_sub(1),
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    self.push(&text);
                } else {
                    self.push(&escape_text(&text));
                }
            }
            Event::Code(code) => self.push(&format!(r"\texttt{{{}}}", escape_text(&code))),
            Event::InlineMath(math) => self.push(&format!("${math}$")),
            Event::DisplayMath(math) => self.push(&format!(r"\[{math}\]")),
            Event::Html(_) | Event::InlineHtml(_) => {}
            Event::FootnoteReference(label) => {
                self.push(&format!("{FOOTNOTE_MARK}{label}{FOOTNOTE_MARK}"));
                self.footnote_labels.push(label.to_string());
            }
            Event::SoftBreak => self.push("\n"),
            Event::HardBreak => self.push("\\\\\n"),
            Event::Rule => self.push("\\noindent\\rule{\\textwidth}{0.4pt}\n\n"),
            Event::TaskListMarker(checked) => self.push(if checked { "{[x]} " } else { "{[ ]} " }),
        }
        Ok(())
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph | Tag::HtmlBlock | Tag::MetadataBlock(_) => {}
            Tag::Heading { level, .. } => {
                let command = match level {
                    HeadingLevel::H1 => "section",
                    HeadingLevel::H2 => "subsection",
                    HeadingLevel::H3 => "subsubsection",
                    HeadingLevel::H4 => "paragraph",
                    HeadingLevel::H5 | HeadingLevel::H6 => "subparagraph",
                };
                self.push(&format!("\\{command}{{"));
            }
            Tag::BlockQuote(_) => self.push("\\begin{quote}\n"),
            Tag::CodeBlock(_) => {
                self.in_code_block = true;
                self.push("\\begin{verbatim}\n");
            }
            Tag::List(Some(start)) => {
                self.push("\\begin{enumerate}\n");
                if start != 1 {
                    self.push(&format!("\\setcounter{{enumi}}{{{}}}\n", start.saturating_sub(1)));
                }
            }
            Tag::List(None) => self.push("\\begin{itemize}\n"),
            Tag::Item => self.push("\\item "),
            Tag::FootnoteDefinition(label) => {
                self.out();
                self.buffers.push(String::new());
                self.open_definitions.push(label.to_string());
            }
            Tag::DefinitionList => self.push("\\begin{description}\n"),
            Tag::DefinitionListTitle => self.push("\\item["),
            Tag::DefinitionListDefinition => {}
            Tag::Table(alignments) => {
                let columns: String = alignments
                    .iter()
                    .map(|a| match a {
                        Alignment::Center => 'c',
                        Alignment::Right => 'r',
                        Alignment::None | Alignment::Left => 'l',
                    })
                    .collect();
                self.push(&format!("\\begin{{tabular}}{{{columns}}}\n"));
            }
            Tag::TableHead | Tag::TableRow => self.cell_index = 0,
            Tag::TableCell => {
                if self.cell_index > 0 {
                    self.push(" & ");
                }
                self.cell_index += 1;
            }
            Tag::Emphasis => self.push("\\emph{"),
            Tag::Strong => self.push("\\textbf{"),
            Tag::Strikethrough => self.push("\\sout{"),
            Tag::Superscript => self.push("\\textsuperscript{"),
            Tag::Subscript => self.push("\\textsubscript{"),
            Tag::Link { dest_url, .. } => self.push(&format!("\\href{{{}}}{{", escape_url(&dest_url))),
            Tag::Image { .. } => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.push("\n\n"),
            TagEnd::Heading(_) => self.push("}\n\n"),
            TagEnd::BlockQuote(_) => self.push("\\end{quote}\n\n"),
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                if !self.out().ends_with('\n') {
                    self.push("\n");
                }
                self.push("\\end{verbatim}\n\n");
            }
            TagEnd::List(true) => self.push("\\end{enumerate}\n\n"),
            TagEnd::List(false) => self.push("\\end{itemize}\n\n"),
            TagEnd::Item | TagEnd::DefinitionListDefinition => self.push("\n"),
            TagEnd::FootnoteDefinition => {
                if self.buffers.len() > 1
                    && let Some(text) = self.buffers.pop()
                    && let Some(label) = self.open_definitions.pop()
                {
                    self.footnotes.insert(label, text.trim().to_owned());
                }
            }
            TagEnd::DefinitionList => self.push("\\end{description}\n\n"),
            TagEnd::DefinitionListTitle => self.push("] "),
            TagEnd::Table => self.push("\\end{tabular}\n\n"),
            TagEnd::TableHead => self.push(" \\\\\n\\hline\n"),
            TagEnd::TableRow => self.push(" \\\\\n"),
            TagEnd::TableCell | TagEnd::HtmlBlock | TagEnd::MetadataBlock(_) | TagEnd::Image => {}
            TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Strikethrough
            | TagEnd::Superscript
            | TagEnd::Subscript
            | TagEnd::Link => self.push("}"),
        }
    }

    fn finish(mut self) -> String {
        let mut out = self.out().clone();
        for label in &self.footnote_labels {
            let marker = format!("{FOOTNOTE_MARK}{label}{FOOTNOTE_MARK}");
            let note = self.footnotes.get(label).map_or("", String::as_str);
            out = out.replace(&marker, &format!("\\footnote{{{note}}}"));
        }
        out
    }
}

/// Path of a content image relative to the page's `.tex` file.
///
/// `url` is relative to the page's directory under `content/`; the `.tex`
/// file lives in the same directory under `cache/tex/`.
pub(crate) fn relative_image_path(root: &Path, page_id: &str, url: &str) -> Result<String, RenderError> {
    let (dir, file) = url.rsplit_once('/').unwrap_or((".", url));
    let page_dir = page_id
        .rsplit_once('/')
        .map_or("", |(dir, _)| dir)
        .trim_start_matches('/');

    let root = fs::canonicalize(root).map_err(|e| RenderError::io(root, e))?;
    let content_dir = root.join("content").join(page_dir).join(dir);
    let content_dir =
        fs::canonicalize(&content_dir).map_err(|_| RenderError::ImageNotFound(content_dir.join(file)))?;
    let full_path = content_dir.join(file);
    if !full_path.is_file() {
        return Err(RenderError::ImageNotFound(full_path));
    }

    let tex_dir = root.join("cache").join("tex").join(page_dir);
    Ok(format!("{}{file}", relative_dir(&tex_dir, &content_dir)))
}

/// Relative path from directory `from` to directory `to`, with a trailing
/// slash, or empty when they are the same.
fn relative_dir(from: &Path, to: &Path) -> String {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut out = "../".repeat(from.len() - common);
    for component in &to[common..] {
        out.push_str(&component.as_os_str().to_string_lossy());
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::markdown::testing::FakeEmbeds;

    fn latex(markdown: &str) -> String {
        to_latex(markdown, &FakeEmbeds::video(), &mut |url| Ok(format!("img/{url}"))).unwrap()
    }

    #[test]
    fn test_headings_and_inline() {
        assert_eq!(
            latex("# Intro\n\nSome *emphasis* and **bold** with `code_1`."),
            "\\section{Intro}\n\nSome \\emph{emphasis} and \\textbf{bold} with \\texttt{code\\_1}.\n\n"
        );
    }

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(latex("50% of $10 & #1_a"), "50\\% of \\$10 \\& \\#1\\_a\n\n");
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            latex("- one\n- two\n\n3. three\n4. four"),
            "\\begin{itemize}\n\\item one\n\\item two\n\\end{itemize}\n\n\
             \\begin{enumerate}\n\\setcounter{enumi}{2}\n\\item three\n\\item four\n\\end{enumerate}\n\n"
        );
    }

    #[test]
    fn test_code_block_is_verbatim() {
        assert_eq!(
            latex("```\nlet x = a_b % 2;\n```"),
            "\\begin{verbatim}\nlet x = a_b % 2;\n\\end{verbatim}\n\n"
        );
    }

    #[test]
    fn test_images_skip_alt_text() {
        assert_eq!(
            latex("![A *cat*](cat.png)"),
            "\\includegraphics{img/cat.png}\n\n"
        );
    }

    #[test]
    fn test_image_errors_propagate() {
        let err = to_latex("![x](missing.png)", &FakeEmbeds::video(), &mut |url| {
            Err(Error::new(minijinja::ErrorKind::InvalidOperation, format!("no {url}")))
        })
        .unwrap_err();
        assert!(err.to_string().contains("no missing.png"));
    }

    #[test]
    fn test_links_and_footnotes() {
        assert_eq!(
            latex("See [docs](https://x.test/a%20b#s)[^n].\n\n[^n]: A note."),
            "See \\href{https://x.test/a\\%20b\\#s}{docs}\\footnote{A note.}.\n\n"
        );
    }

    #[test]
    fn test_table() {
        assert_eq!(
            latex("| a | b |\n|:-|-:|\n| 1 | 2 |"),
            "\\begin{tabular}{lr}\na & b \\\\\n\\hline\n1 & 2 \\\\\n\\end{tabular}\n\n"
        );
    }

    #[test]
    fn test_embeds() {
        assert_eq!(
            latex("https://video.test/watch?v=q1"),
            "[video:q1]\n\n"
        );
    }

    #[test]
    fn test_relative_image_path() {
        let tmp = TempDir::new().unwrap();
        let images = tmp.path().join("content/subdir/images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("cat.png"), "png").unwrap();
        fs::write(tmp.path().join("content/top.png"), "png").unwrap();

        assert_eq!(
            relative_image_path(tmp.path(), "/subdir/page", "images/cat.png").unwrap(),
            "../../../content/subdir/images/cat.png"
        );
        assert_eq!(
            relative_image_path(tmp.path(), "/simple", "top.png").unwrap(),
            "../../content/top.png"
        );
    }

    #[test]
    fn test_missing_image() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("content")).unwrap();

        let err = relative_image_path(tmp.path(), "/page", "nope.png").unwrap_err();
        assert!(matches!(err, RenderError::ImageNotFound(_)));
        assert!(err.to_string().contains("nope.png"));
    }
}
