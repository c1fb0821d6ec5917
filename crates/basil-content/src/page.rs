//! A single content file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::ContentError;
use crate::frontmatter::{self, ParsedContent};
use crate::value::Metadata;

/// A content file identified by its page id.
///
/// Contents are read lazily and kept until the page is written.
#[derive(Debug)]
pub struct Page {
    id: String,
    source_path: PathBuf,
    parsed: RwLock<Option<Arc<ParsedContent>>>,
}

impl Page {
    /// Create a page. The id is normalised to start with exactly one slash.
    pub fn new(id: &str, source_path: PathBuf) -> Self {
        Self {
            id: format!("/{}", id.trim_start_matches('/')),
            source_path,
            parsed: RwLock::new(None),
        }
    }

    /// Page id, e.g. `/subdir/foo`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path to the source file, which need not exist yet.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Raw file contents. A missing file reads as empty.
    pub fn contents(&self) -> Result<String, ContentError> {
        match fs::read_to_string(&self.source_path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(ContentError::Io {
                path: self.source_path.clone(),
                source,
            }),
        }
    }

    /// Metadata and body, parsed once and cached.
    ///
    /// Malformed frontmatter is logged and replaced by the default metadata.
    pub fn parsed(&self) -> Result<Arc<ParsedContent>, ContentError> {
        if let Some(parsed) = self.parsed.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(parsed));
        }

        let contents = self.contents()?;
        let (parsed, error) = frontmatter::parse(&contents);
        if let Some(error) = error {
            tracing::warn!(page = %self.id, "Error reading metadata: {error}");
        }

        let parsed = Arc::new(parsed);
        *self.parsed.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&parsed));
        Ok(parsed)
    }

    pub fn metadata(&self) -> Result<Metadata, ContentError> {
        Ok(self.parsed()?.metadata.clone())
    }

    pub fn body(&self) -> Result<String, ContentError> {
        Ok(self.parsed()?.body.clone())
    }

    /// Name of the template this page renders with.
    pub fn template_name(&self) -> Result<String, ContentError> {
        Ok(frontmatter::template_name(&self.parsed()?.metadata))
    }

    /// Relative link from this page to the page `target_id`.
    ///
    /// ```
    /// use basil_content::Page;
    ///
    /// let page = Page::new("/subdir/subdir/deep", "deep.md".into());
    /// assert_eq!(page.link("subdir/foo"), "../../subdir/foo");
    /// ```
    pub fn link(&self, target_id: &str) -> String {
        let depth = self.id.split('/').filter(|s| !s.is_empty()).count();
        let mut parts: Vec<&str> = vec![".."; depth.saturating_sub(1)];
        parts.extend(target_id.split('/').filter(|s| !s.is_empty()));
        parts.join("/")
    }

    /// Directory part of the id: `/a/b/c` gives `/a/b`, `/c` gives ``.
    pub fn id_dir(&self) -> &str {
        self.id.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    /// Write new metadata and body to the source file.
    ///
    /// Returns `false` without touching the file when nothing changed.
    pub fn write(&self, metadata: &Metadata, body: &str) -> Result<bool, ContentError> {
        let current = self.parsed()?;
        if metadata.same_entries(&current.metadata) && body.trim() == current.body {
            tracing::info!(page = %self.id, "No change required");
            return Ok(false);
        }

        let contents = frontmatter::serialize(metadata, body).map_err(|source| {
            ContentError::Serialize {
                page: self.id.clone(),
                source,
            }
        })?;
        if let Some(parent) = self.source_path.parent() {
            fs::create_dir_all(parent).map_err(|source| ContentError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.source_path, contents).map_err(|source| ContentError::Io {
            path: self.source_path.clone(),
            source,
        })?;
        tracing::info!(page = %self.id, path = %self.source_path.display(), "Wrote page");

        *self.parsed.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MetaValue;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn page_at(tmp: &TempDir, id: &str, contents: Option<&str>) -> Page {
        let path = tmp.path().join(format!("{}.md", id.trim_start_matches('/')));
        if let Some(contents) = contents {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, contents).unwrap();
        }
        Page::new(id, path)
    }

    #[test]
    fn test_id_is_normalised() {
        assert_eq!(Page::new("simple", PathBuf::new()).id(), "/simple");
        assert_eq!(Page::new("//simple", PathBuf::new()).id(), "/simple");
    }

    #[test]
    fn test_link() {
        let simple = Page::new("/simple", PathBuf::new());
        assert_eq!(simple.link("subdir/foo"), "subdir/foo");

        let foo = Page::new("/subdir/foo", PathBuf::new());
        assert_eq!(foo.link("simple"), "../simple");

        let deep = Page::new("/subdir/subdir/deep", PathBuf::new());
        assert_eq!(deep.link("subdir/foo"), "../../subdir/foo");
        assert_eq!(deep.link("/subdir/foo"), "../../subdir/foo");
    }

    #[test]
    fn test_id_dir() {
        assert_eq!(Page::new("/simple", PathBuf::new()).id_dir(), "");
        assert_eq!(Page::new("/a/b/c", PathBuf::new()).id_dir(), "/a/b");
    }

    #[test]
    fn test_missing_file_is_empty_page() {
        let tmp = TempDir::new().unwrap();
        let page = page_at(&tmp, "/missing", None);
        assert_eq!(page.body().unwrap(), "");
        assert_eq!(page.template_name().unwrap(), "index");
    }

    #[test]
    fn test_metadata_and_body() {
        let tmp = TempDir::new().unwrap();
        let page = page_at(
            &tmp,
            "/simple",
            Some("---\ntitle: The title\ntags: [one, two]\n---\nThe body text.\n"),
        );

        let metadata = page.metadata().unwrap();
        assert_eq!(metadata.keys().collect::<Vec<_>>(), vec!["template", "title", "tags"]);
        assert_eq!(page.body().unwrap(), "The body text.");
    }

    #[test]
    fn test_poisoned_cache_still_reads() {
        let tmp = TempDir::new().unwrap();
        let page = page_at(&tmp, "/simple", Some("---\ntitle: T\n---\nBody.\n"));
        std::thread::scope(|scope| {
            let result = scope
                .spawn(|| {
                    let _guard = page.parsed.write().unwrap();
                    panic!("render thread died");
                })
                .join();
            assert!(result.is_err());
        });
        assert!(page.parsed.is_poisoned());

        assert_eq!(page.body().unwrap(), "Body.");
        assert!(page.write(&page.metadata().unwrap(), "Changed.").unwrap());
        assert_eq!(page.body().unwrap(), "Changed.");
    }

    #[test]
    fn test_write_unchanged_is_noop() {
        let tmp = TempDir::new().unwrap();
        let original = "---\ntitle: The title\n---\nThe body text.\n";
        let page = page_at(&tmp, "/simple", Some(original));

        let changed = page
            .write(&page.metadata().unwrap(), &page.body().unwrap())
            .unwrap();
        assert!(!changed);
        // The default template key was not written back.
        assert_eq!(page.contents().unwrap(), original);
    }

    #[test]
    fn test_write_ignores_key_order() {
        let tmp = TempDir::new().unwrap();
        let page = page_at(&tmp, "/simple", Some("---\ntitle: A\ndraft: false\n---\nBody.\n"));

        let reordered: Metadata = [
            ("title", MetaValue::from("A")),
            ("template", MetaValue::from("index")),
            ("draft", MetaValue::Bool(false)),
        ]
        .into_iter()
        .collect();
        assert!(!page.write(&reordered, "Body.").unwrap());
    }

    #[test]
    fn test_write_changes_and_invalidates() {
        let tmp = TempDir::new().unwrap();
        let page = page_at(&tmp, "/simple", Some("---\ntitle: Old\n---\nBody.\n"));
        assert_eq!(page.body().unwrap(), "Body.");

        let mut metadata = page.metadata().unwrap();
        metadata.insert("title", MetaValue::from("New"));
        assert!(page.write(&metadata, "New body.").unwrap());

        assert_eq!(
            page.contents().unwrap(),
            "---\ntemplate: index\ntitle: New\n---\nNew body.\n"
        );
        assert_eq!(page.metadata().unwrap(), metadata);
        assert_eq!(page.body().unwrap(), "New body.");
    }

    #[test]
    fn test_write_replaces_all_metadata() {
        let tmp = TempDir::new().unwrap();
        let page = page_at(&tmp, "/simple", Some("---\ntitle: Old\n---\nBody.\n"));

        let metadata: Metadata = [("foo", MetaValue::from("bar"))].into_iter().collect();
        page.write(&metadata, &page.body().unwrap()).unwrap();
        assert_eq!(page.contents().unwrap(), "---\nfoo: bar\n---\nBody.\n");
    }

    #[test]
    fn test_write_new_page_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let page = page_at(&tmp, "/subdir/new-page-2", None);

        let metadata: Metadata = [("int_number", MetaValue::Int(123))].into_iter().collect();
        page.write(&metadata, "").unwrap();
        assert_eq!(page.contents().unwrap(), "---\nint_number: 123\n---\n");
    }
}
