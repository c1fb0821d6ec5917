//! The build entry point.

use std::path::PathBuf;
use std::sync::Arc;

use basil_config::CliSettings;
use basil_content::Site;
use basil_enrich::ExternalDataCache;
use basil_query::QueryStore;

use crate::RenderError;
use crate::pdf::PdfCompiler;
use crate::renderer::TemplateRenderer;

/// Location of the persisted query store, relative to the cache directory.
pub const DATABASE_PATH: &str = "database/db.sqlite3";

/// What to build.
#[derive(Debug, Default)]
pub struct BuildOptions {
    /// Site root directory.
    pub root: PathBuf,
    /// Override of the configured cache TTL in seconds.
    pub ttl: Option<u64>,
    /// Page ids to render. Empty renders every page.
    pub pages: Vec<String>,
    /// Reuse the table from a previous build instead of ingesting pages.
    pub skip_ingest: bool,
    /// Compiler for the `tex` format, `latexmk` when unset.
    pub compiler: Option<PdfCompiler>,
}

/// Result of a successful build.
#[derive(Debug, Default, PartialEq)]
pub struct BuildSummary {
    /// Number of pages rendered.
    pub pages: usize,
    /// Every file written to the output tree.
    pub outputs: Vec<PathBuf>,
}

/// Build the site at `options.root`.
///
/// Pages are ingested into the query store before any page renders, then
/// rendered one at a time. The first error aborts the build.
pub fn build(options: BuildOptions) -> Result<BuildSummary, RenderError> {
    let cli_settings = CliSettings { ttl: options.ttl };
    let site = Arc::new(Site::load(&options.root, Some(&cli_settings))?);

    let store = Arc::new(QueryStore::open(&site.cache_dir().join(DATABASE_PATH))?);
    if options.skip_ingest {
        let columns = store.load_schema()?;
        tracing::info!(columns = columns.len(), "Reusing page database");
    } else {
        let rows = store.ingest(site.pages())?;
        tracing::info!(rows, "Ingested pages");
    }

    let data = Arc::new(ExternalDataCache::for_site(site.root(), site.config()));
    let mut renderer = TemplateRenderer::new(Arc::clone(&site), store, data)?;
    if let Some(compiler) = options.compiler {
        renderer = renderer.with_compiler(compiler);
    }

    let pages = if options.pages.is_empty() {
        site.pages().to_vec()
    } else {
        options.pages.iter().map(|id| site.page_or_new(id)).collect()
    };
    if pages.is_empty() {
        tracing::warn!(dir = %site.content_dir().display(), "No pages to render");
    }

    let mut summary = BuildSummary::default();
    for page in &pages {
        summary.outputs.extend(renderer.render(page)?);
        summary.pages += 1;
    }
    Ok(summary)
}
