//! Local SQLite store for harvested papers, their summaries and the search log.
//!
//! The store owns a single connection. Every operation is expressed as a
//! [`DatabaseInstruction`] that runs in its own transaction; no transaction spans two
//! instructions. The pipeline therefore inserts a paper and, much later, its summary as two
//! independent units of work. A crash in between leaves the paper unprocessed, and the next batch
//! picks it up again.
//!
//! # Examples
//!
//! ```no_run
//! use harvest::{
//!   database::{Add, AddOutcome, Database, Query, Statistics},
//!   prelude::*,
//!   record::PaperRecord,
//! };
//!
//! # async fn example(paper: PaperRecord) -> Result<(), HarvestError> {
//! let mut db = Database::open(Database::default_path()).await?;
//!
//! if let AddOutcome::Inserted(id) = Add::paper(&paper).execute(&mut db).await? {
//!   Add::summary(id, "methodology", "contributions").execute(&mut db).await?;
//! }
//!
//! let pending = Query::unprocessed(10).execute(&mut db).await?;
//! let stats = Statistics.execute(&mut db).await?;
//! println!("{} pending, {} total", pending.len(), stats.total);
//! # Ok(())
//! # }
//! ```

use rusqlite::{
  types::{Type, Value},
  Row,
};
use tokio_rusqlite::Connection;

use super::*;

pub mod instruction;

pub use self::instruction::*;

/// Column list shared by every query that materializes a [`PaperRecord`].
///
/// The order here is the order [`paper_from_row`] reads them in.
pub(crate) const PAPER_COLUMNS: &str = "p.id, p.external_id, p.title, p.abstract_text, p.authors, \
                                        p.categories, p.published, p.updated, p.pdf_link, \
                                        p.abstract_link, p.processed, p.relevance_score, \
                                        p.created_at";

/// Number of columns in [`PAPER_COLUMNS`].
pub(crate) const PAPER_COLUMN_COUNT: usize = 13;

/// Handle for interacting with the paper store.
pub struct Database {
  /// Async SQLite connection handle
  pub(crate) conn: Connection,
}

impl Database {
  /// Opens an existing store or creates a new one at the specified path.
  ///
  /// Missing parent directories are created and the schema is applied idempotently, so opening
  /// the same file twice is harmless.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path).await?;
    Self::initialize(conn).await
  }

  /// Opens a throwaway in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().await?;
    Self::initialize(conn).await
  }

  /// Applies the schema to a fresh connection.
  async fn initialize(conn: Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;

    debug!("Database schema initialized");
    Ok(Self { conn })
  }

  /// Returns the default path for the database file.
  ///
  /// - On Unix: `~/.local/share/harvest/harvest.db`
  /// - On macOS: `~/Library/Application Support/harvest/harvest.db`
  /// - On Windows: `%APPDATA%\harvest\harvest.db`
  /// - Fallback: `./harvest/harvest.db`
  pub fn default_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("harvest").join("harvest.db")
  }

  /// Closes the connection, flushing anything SQLite still buffers.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }
}

/// Formats a timestamp the way every TEXT date column stores it.
///
/// Second precision with a `Z` suffix keeps the column lexically sortable and understood by
/// SQLite's own date functions.
pub(crate) fn to_sql_timestamp(dt: &DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Parses a TEXT date column written by [`to_sql_timestamp`] or the schema defaults.
pub(crate) fn timestamp_from_row(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
  let raw: String = row.get(idx)?;
  DateTime::parse_from_rfc3339(&raw)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decodes a JSON array column into a list of strings.
fn json_list_from_row(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
  let raw: String = row.get(idx)?;
  serde_json::from_str(&raw)
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Builds a [`PaperRecord`] from a row selected with [`PAPER_COLUMNS`].
pub(crate) fn paper_from_row(row: &Row) -> rusqlite::Result<PaperRecord> {
  Ok(PaperRecord {
    id:              Some(row.get(0)?),
    external_id:     row.get(1)?,
    title:           row.get(2)?,
    abstract_text:   row.get(3)?,
    authors:         json_list_from_row(row, 4)?,
    categories:      json_list_from_row(row, 5)?,
    published:       timestamp_from_row(row, 6)?,
    updated:         timestamp_from_row(row, 7)?,
    pdf_link:        row.get(8)?,
    abstract_link:   row.get(9)?,
    processed:       row.get(10)?,
    relevance_score: row.get(11)?,
    created_at:      timestamp_from_row(row, 12)?,
  })
}

/// Runs `sql` with `params` and collects every row as a [`PaperRecord`].
pub(crate) fn collect_papers(
  conn: &rusqlite::Connection,
  sql: &str,
  params: Vec<Value>,
) -> rusqlite::Result<Vec<PaperRecord>> {
  let mut stmt = conn.prepare_cached(sql)?;
  let papers = stmt
    .query_map(rusqlite::params_from_iter(params), paper_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(papers)
}
