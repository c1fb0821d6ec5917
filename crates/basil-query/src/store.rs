//! SQLite-backed page table.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use basil_content::Page;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tokio::runtime::Runtime;

use crate::QueryError;
use crate::row::{Param, Row, SqlValue};

/// Name of the table holding one row per page.
pub const TABLE_NAME: &str = "pages";

/// Column set for pages with the given metadata keys.
///
/// Lowercased, sorted and deduplicated; always contains `id` and `body`.
pub fn compute_schema<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut columns: BTreeSet<String> = ["id", "body"].into_iter().map(str::to_owned).collect();
    columns.extend(
        keys.into_iter()
            .map(str::to_lowercase)
            .filter(|k| !k.is_empty()),
    );
    columns.into_iter().collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite store for page metadata.
///
/// The build is synchronous, so the store owns a current-thread runtime and
/// blocks on each database call. A single pooled connection is kept open for
/// the lifetime of the store so in-memory databases survive between calls.
#[derive(Debug)]
pub struct QueryStore {
    // Dropped before the runtime.
    pool: SqlitePool,
    runtime: Runtime,
    columns: OnceLock<Vec<String>>,
}

impl QueryStore {
    /// Open (creating if needed) a database file.
    pub fn open(path: &Path) -> Result<Self, QueryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| QueryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, QueryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(QueryError::Open)?;
        Self::connect(options)
    }

    fn connect(options: SqliteConnectOptions) -> Result<Self, QueryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(QueryError::Runtime)?;
        let pool = runtime
            .block_on(
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options),
            )
            .map_err(QueryError::Open)?;
        Ok(Self {
            pool,
            runtime,
            columns: OnceLock::new(),
        })
    }

    /// Column set for `pages`, computed on first call and reused afterwards.
    pub fn schema(&self, pages: &[Arc<Page>]) -> Result<&[String], QueryError> {
        if let Some(columns) = self.columns.get() {
            return Ok(columns);
        }
        let mut metadata = Vec::with_capacity(pages.len());
        for page in pages {
            metadata.push(page.metadata()?);
        }
        let columns = compute_schema(metadata.iter().flat_map(|m| m.keys()));
        tracing::debug!(?columns, "computed page schema");
        Ok(self.columns.get_or_init(|| columns))
    }

    /// Column set read back from an existing table.
    ///
    /// Used when ingestion is skipped and the database from a previous build is
    /// reused.
    pub fn load_schema(&self) -> Result<&[String], QueryError> {
        if let Some(columns) = self.columns.get() {
            return Ok(columns);
        }
        let sql = format!("PRAGMA table_info({})", quote_ident(TABLE_NAME));
        let info: Vec<(i32, String, String, i32, Option<String>, i32)> = self
            .runtime
            .block_on(sqlx::query_as(&sql).fetch_all(&self.pool))
            .map_err(|source| QueryError::Query {
                sql: sql.clone(),
                source,
            })?;
        let columns = info.into_iter().map(|(_, name, ..)| name).collect();
        Ok(self.columns.get_or_init(|| columns))
    }

    /// Memoized columns, if computed.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.get().map(Vec::as_slice)
    }

    /// Recreate the table and insert one row per page.
    ///
    /// Returns the number of rows inserted.
    pub fn ingest(&self, pages: &[Arc<Page>]) -> Result<usize, QueryError> {
        let columns = self.schema(pages)?.to_vec();
        let table = quote_ident(TABLE_NAME);
        let definitions: Vec<String> = columns
            .iter()
            .map(|c| {
                if c == "id" {
                    format!("{} TEXT UNIQUE", quote_ident(c))
                } else {
                    format!("{} TEXT", quote_ident(c))
                }
            })
            .collect();
        let drop_sql = format!("DROP TABLE IF EXISTS {table}");
        let create_sql = format!("CREATE TABLE {table} ({})", definitions.join(", "));
        let insert_sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            vec!["?"; columns.len()].join(", ")
        );

        let mut rows = Vec::with_capacity(pages.len());
        for page in pages {
            rows.push((page.id().to_owned(), row_values(page, &columns)?));
        }

        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await.map_err(QueryError::Open)?;
            for sql in [&drop_sql, &create_sql] {
                sqlx::query(sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(|source| QueryError::Query {
                        sql: sql.clone(),
                        source,
                    })?;
            }
            for (id, values) in &rows {
                let mut query = sqlx::query(&insert_sql);
                for value in values {
                    query = query.bind(value.as_deref());
                }
                query
                    .execute(&mut *tx)
                    .await
                    .map_err(|source| QueryError::Ingest {
                        page: id.clone(),
                        source,
                    })?;
            }
            tx.commit().await.map_err(QueryError::Open)
        })?;

        tracing::info!(pages = rows.len(), columns = columns.len(), "stored pages");
        Ok(rows.len())
    }

    /// Run a parameterized query and return all rows.
    pub fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, QueryError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Param::Null => query.bind(None::<String>),
                Param::Bool(b) => query.bind(*b),
                Param::Int(i) => query.bind(*i),
                Param::Text(s) => query.bind(s.as_str()),
            };
        }
        let to_error = |source| QueryError::Query {
            sql: sql.to_owned(),
            source,
        };
        let rows = self
            .runtime
            .block_on(query.fetch_all(&self.pool))
            .map_err(to_error)?;
        rows.iter().map(|r| decode_row(r).map_err(to_error)).collect()
    }
}

/// Column values for one page, `None` for SQL NULL.
fn row_values(page: &Page, columns: &[String]) -> Result<Vec<Option<String>>, QueryError> {
    let parsed = page.parsed()?;
    Ok(columns
        .iter()
        .map(|column| match column.as_str() {
            "id" => Some(page.id().to_owned()),
            "body" => Some(parsed.body.clone()),
            key => parsed
                .metadata
                .get_ignore_case(key)
                .and_then(basil_content::MetaValue::to_column_text),
        })
        .collect())
}

fn decode_row(row: &SqliteRow) -> Result<Row, sqlx::Error> {
    let mut decoded = Row::default();
    for (i, column) in row.columns().iter().enumerate() {
        let (is_null, type_name) = {
            let raw = row.try_get_raw(i)?;
            (raw.is_null(), raw.type_info().name().to_owned())
        };
        let value = if is_null {
            SqlValue::Null
        } else {
            match type_name.as_str() {
                "INTEGER" => SqlValue::Int(row.try_get(i)?),
                "REAL" => SqlValue::Real(row.try_get(i)?),
                "BLOB" => SqlValue::Blob(row.try_get(i)?),
                _ => SqlValue::Text(row.try_get(i)?),
            }
        };
        decoded.push(column.name().to_owned(), value);
    }
    Ok(decoded)
}
