//! Template rendering for basil sites.
//!
//! [`TemplateRenderer`] renders each page through the `minijinja` templates
//! found under `templates/`, once per format the page's template provides.
//! The `tex` format is compiled to PDF by [`PdfCompiler`]. Templates get the
//! page, the site and the query store in their context, plus the filters and
//! functions registered in [`functions`].
//!
//! [`build`] runs a whole build: ingest pages into the query store, then
//! render them one at a time.

mod build;
mod escape;
mod formats;
pub mod functions;
mod markdown;
mod objects;
mod pdf;
mod renderer;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use build::{BuildOptions, BuildSummary, DATABASE_PATH, build};
pub use escape::{escape_csv, escape_tex};
pub use formats::{TEMPLATE_EXT, get_formats, template_file};
pub use pdf::PdfCompiler;
pub use renderer::TemplateRenderer;

/// Error returned when rendering fails.
///
/// Only frontmatter problems are recovered from; everything here aborts the
/// build.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Templates directory does not exist: {}", .0.display())]
    TemplatesDirMissing(PathBuf),

    #[error("No formats found for template: {name}\n(e.g. for HTML, create {})", suggestion.display())]
    NoFormats { name: String, suggestion: PathBuf },

    #[error("Unable to render {page}: {source:#}")]
    Template {
        page: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to run {program}: {source}")]
    CompileSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("LaTeX compilation of {} failed ({status}):\n{log}", source_path.display())]
    Compile {
        source_path: PathBuf,
        status: String,
        log: String,
    },

    #[error("LaTeX compilation of {} timed out after {timeout:?}", source_path.display())]
    CompileTimeout {
        source_path: PathBuf,
        timeout: Duration,
    },

    #[error("Unable to generate PDF from {}", source_path.display())]
    PdfMissing { source_path: PathBuf },

    #[error("Unable to find image: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error(transparent)]
    Content(#[from] basil_content::ContentError),

    #[error(transparent)]
    Query(#[from] basil_query::QueryError),

    #[error(transparent)]
    Enrich(#[from] basil_enrich::EnrichError),
}

impl RenderError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
