//! Aggregate counts over the store.

use super::*;

/// Computes [`StoreStatistics`] fresh on every execution.
#[derive(Debug, Clone, Copy)]
pub struct Statistics;

/// Snapshot of the store's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
  /// Every stored paper
  pub total:        usize,
  /// Papers in a terminal state
  pub processed:    usize,
  /// Papers still waiting for the pipeline
  pub unprocessed:  usize,
  /// Papers published within the last seven days
  pub last_7_days:  usize,
  /// Paper count per primary category
  pub by_category:  BTreeMap<String, usize>,
}

#[async_trait]
impl DatabaseInstruction for Statistics {
  type Output = StoreStatistics;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let stats = db
      .conn
      .call(|conn| {
        let count = |sql: &str| -> rusqlite::Result<usize> {
          conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n as usize)
        };

        let total = count("SELECT COUNT(*) FROM papers")?;
        let processed = count("SELECT COUNT(*) FROM papers WHERE processed = 1")?;
        let last_7_days = count(
          "SELECT COUNT(*) FROM papers WHERE DATE(published) >= DATE('now', '-7 days')",
        )?;

        let mut stmt = conn.prepare_cached(
          "SELECT COALESCE(json_extract(categories, '$[0]'), 'unknown') AS primary_category,
                  COUNT(*)
           FROM papers
           GROUP BY primary_category",
        )?;
        let by_category = stmt
          .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
          .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        Ok(StoreStatistics {
          total,
          processed,
          unprocessed: total - processed,
          last_7_days,
          by_category,
        })
      })
      .await?;

    Ok(stats)
  }
}
