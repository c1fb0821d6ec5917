//! Content model for basil.
//!
//! A [`Site`] discovers the content files under its `content/` directory and
//! exposes each as a [`Page`]. Pages split into [`Metadata`] and a body via
//! the [`frontmatter`] module; metadata values are normalised into the
//! [`MetaValue`] tagged union.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use basil_content::Site;
//!
//! let site = Site::load(Path::new("my-site"), None)?;
//! for page in site.pages() {
//!     println!("{} uses {}", page.id(), page.template_name()?);
//! }
//! # Ok::<(), basil_content::ContentError>(())
//! ```

pub mod frontmatter;
mod page;
mod scanner;
mod site;
mod value;

use std::path::PathBuf;

pub use frontmatter::{FrontmatterError, ParsedContent};
pub use page::Page;
pub use site::Site;
pub use value::{MetaValue, Metadata, parse_timestamp};

/// Error reading or writing content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unable to serialize metadata for {page}: {source}")]
    Serialize {
        page: String,
        source: FrontmatterError,
    },
    #[error(transparent)]
    Config(#[from] basil_config::ConfigError),
}
