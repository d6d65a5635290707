//! The append-only search log.

use rusqlite::params;

use super::*;

/// Appends one entry to the search log.
#[derive(Debug, Clone)]
pub struct LogSearch {
  /// Query string sent to the search service
  query:        String,
  /// Category scope of the search, if any
  category:     Option<String>,
  /// Number of records the search yielded
  result_count: usize,
}

impl LogSearch {
  /// Creates a log entry for a finished search.
  pub fn new(query: &str, category: Option<&str>, result_count: usize) -> Self {
    Self { query: query.to_string(), category: category.map(str::to_string), result_count }
  }
}

#[async_trait]
impl DatabaseInstruction for LogSearch {
  type Output = i64;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let LogSearch { query, category, result_count } = self.clone();

    let id = db
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO search_log (query, category, result_count) VALUES (?1, ?2, ?3)",
          params![query, category, result_count as i64],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(id)
  }
}

/// Reads the most recent `limit` search log entries, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct SearchHistory {
  /// How many entries to return
  pub limit: usize,
}

#[async_trait]
impl DatabaseInstruction for SearchHistory {
  type Output = Vec<SearchLogEntry>;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let limit = self.limit as i64;

    let entries = db
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT id, query, category, result_count, searched_at FROM (
             SELECT * FROM search_log ORDER BY id DESC LIMIT ?1
           ) ORDER BY id ASC",
        )?;
        let entries = stmt
          .query_map([limit], |row| {
            Ok(SearchLogEntry {
              id:           row.get(0)?,
              query:        row.get(1)?,
              category:     row.get(2)?,
              result_count: row.get::<_, i64>(3)? as usize,
              searched_at:  timestamp_from_row(row, 4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
      })
      .await?;

    Ok(entries)
  }
}
