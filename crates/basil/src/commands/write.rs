//! `basil write` command implementation.

use std::path::PathBuf;

use basil_content::{MetaValue, Metadata, Site};
use basil_query::{QueryStore, Row, SqlValue};
use basil_render::DATABASE_PATH;
use clap::Args;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the write command.
#[derive(Args)]
pub(crate) struct WriteArgs {
    /// Site root directory.
    #[arg(default_value = ".")]
    dir: PathBuf,
}

impl WriteArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let written = write_pages(&Site::load(&self.dir, None)?)?;
        output.written(written);
        Ok(())
    }
}

/// Write every row of the page database back to its content file.
///
/// Returns the number of files that changed.
fn write_pages(site: &Site) -> Result<usize, CliError> {
    let db_path = site.cache_dir().join(DATABASE_PATH);
    if !db_path.is_file() {
        return Err(CliError::Validation(format!(
            "No database found at {}. Run `basil build` first.",
            db_path.display()
        )));
    }
    let store = QueryStore::open(&db_path)?;

    let mut written = 0;
    for row in store.query("SELECT * FROM pages ORDER BY id", &[])? {
        let Some(id) = row.get("id").and_then(SqlValue::as_str) else {
            continue;
        };
        let body = row.get("body").and_then(SqlValue::as_str).unwrap_or_default();
        let page = site.page_or_new(id);
        let current = page.metadata()?;
        if page.write(&row_metadata(&row, &current), body)? {
            written += 1;
        }
    }
    Ok(written)
}

/// Metadata stored in a row: every column but `id` and `body`, nulls dropped.
///
/// Columns whose text still matches the page's current value keep that value
/// and its key spelling, so booleans and floats survive an untouched round trip.
fn row_metadata(row: &Row, current: &Metadata) -> Metadata {
    row.iter()
        .filter(|(name, _)| !matches!(*name, "id" | "body"))
        .filter_map(|(name, value)| {
            let text = match value {
                SqlValue::Null => return None,
                SqlValue::Int(i) => i.to_string(),
                SqlValue::Real(f) => f.to_string(),
                SqlValue::Text(text) => text.clone(),
                SqlValue::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            };
            let unchanged = current
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .filter(|(_, value)| value.to_column_text().as_deref() == Some(text.as_str()));
            Some(match unchanged {
                Some((key, value)) => (key.to_owned(), value.clone()),
                None => (name.to_owned(), decode_column(value, &text)),
            })
        })
        .collect()
}

fn decode_column(value: &SqlValue, text: &str) -> MetaValue {
    match value {
        SqlValue::Int(i) => MetaValue::Int(*i),
        SqlValue::Real(f) => MetaValue::Float(*f),
        SqlValue::Text(_) => MetaValue::from_column_text(text),
        SqlValue::Null | SqlValue::Blob(_) => MetaValue::String(text.to_owned()),
    }
}
