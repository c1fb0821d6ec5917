//! A site: a root directory with content, templates, cache and output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use basil_config::{CliSettings, Config};

use crate::ContentError;
use crate::page::Page;
use crate::scanner::Scanner;

/// Pages in discovery order plus an id index.
#[derive(Debug)]
struct PageIndex {
    pages: Vec<Arc<Page>>,
    by_id: HashMap<String, usize>,
}

/// A site rooted at a directory.
///
/// ```text
/// {root}/
/// +-- basil.toml
/// +-- content/      # pages
/// +-- templates/    # <name>.<format>.jinja
/// +-- cache/        # database, tex sources, enrichment caches
/// +-- output/       # rendered artifacts
/// ```
#[derive(Debug)]
pub struct Site {
    root: PathBuf,
    config: Config,
    pages: OnceLock<PageIndex>,
}

impl Site {
    pub fn new(root: PathBuf, config: Config) -> Self {
        Self {
            root,
            config,
            pages: OnceLock::new(),
        }
    }

    /// Load the site configuration from `root` and create the site.
    pub fn load(root: &Path, cli_settings: Option<&CliSettings>) -> Result<Self, ContentError> {
        let config = Config::load(root, cli_settings)?;
        Ok(Self::new(root.to_path_buf(), config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn title(&self) -> &str {
        &self.config.title
    }

    pub fn lang(&self) -> &str {
        &self.config.lang
    }

    /// Content file extension with leading dot.
    pub fn ext(&self) -> &str {
        &self.config.ext
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// All pages, discovered on first access.
    pub fn pages(&self) -> &[Arc<Page>] {
        &self.index().pages
    }

    /// A discovered page by id.
    pub fn page(&self, id: &str) -> Option<Arc<Page>> {
        let index = self.index();
        let id = format!("/{}", id.trim_start_matches('/'));
        index.by_id.get(&id).map(|&i| Arc::clone(&index.pages[i]))
    }

    /// A discovered page by id, or a fresh page whose file may not exist yet.
    pub fn page_or_new(&self, id: &str) -> Arc<Page> {
        self.page(id).unwrap_or_else(|| {
            let id = id.trim_start_matches('/');
            let path = self.content_dir().join(format!("{id}{}", self.ext()));
            Arc::new(Page::new(id, path))
        })
    }

    fn index(&self) -> &PageIndex {
        self.pages.get_or_init(|| {
            let scanner = Scanner::new(self.content_dir(), self.ext().to_owned());
            let pages: Vec<Arc<Page>> = scanner
                .scan()
                .into_iter()
                .map(|r| Arc::new(Page::new(&r.id, r.path)))
                .collect();
            let by_id = pages
                .iter()
                .enumerate()
                .map(|(i, page)| (page.id().to_owned(), i))
                .collect();
            tracing::debug!(count = pages.len(), "discovered pages");
            PageIndex { pages, by_id }
        })
    }
}
