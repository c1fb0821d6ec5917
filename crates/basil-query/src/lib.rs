//! Queryable projection of page metadata.
//!
//! Every page becomes one row of the `pages` table. The columns are the
//! union of all metadata keys across the site plus `id` and `body`, so
//! templates can run ad-hoc SQL over the whole site:
//!
//! ```sql
//! SELECT id, title FROM pages WHERE template = ? ORDER BY date DESC
//! ```
//!
//! All columns are `TEXT`. Dates are stored as ISO-8601 and lists as JSON.

mod row;
mod store;

pub use row::{Param, Row, SqlValue};
pub use store::{QueryStore, TABLE_NAME, compute_schema};

/// Query store error.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Unable to start the query runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Unable to open database: {0}")]
    Open(#[source] sqlx::Error),
    #[error("Unable to store page {page}: {source}")]
    Ingest {
        page: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Query failed: {source}\n{sql}")]
    Query {
        sql: String,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Content(#[from] basil_content::ContentError),
}
