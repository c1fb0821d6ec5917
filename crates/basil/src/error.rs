//! CLI error types.

use std::path::PathBuf;

use basil_config::ConfigError;
use basil_content::ContentError;
use basil_query::QueryError;
use basil_render::RenderError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Content(#[from] ContentError),

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("Unable to clean {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Validation(String),
}
