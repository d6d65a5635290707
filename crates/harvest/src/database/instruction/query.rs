//! Read instructions for papers.

use super::*;

/// Filters for listing stored papers.
///
/// All filters are optional and combine with `AND`.
#[derive(Debug, Clone)]
pub struct SearchFilter {
  /// Substring matched against title or abstract
  pub text:           Option<String>,
  /// Substring matched against the serialized category list
  pub category:       Option<String>,
  /// Only return papers that reached a terminal state
  pub processed_only: bool,
  /// Maximum number of papers returned
  pub limit:          usize,
}

impl Default for SearchFilter {
  fn default() -> Self { Self { text: None, category: None, processed_only: false, limit: 50 } }
}

impl SearchFilter {
  /// Sets the title/abstract substring.
  pub fn text(mut self, text: impl Into<String>) -> Self {
    self.text = Some(text.into());
    self
  }

  /// Sets the category substring.
  pub fn category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  /// Restricts the listing to processed papers.
  pub fn processed_only(mut self) -> Self {
    self.processed_only = true;
    self
  }

  /// Sets the maximum number of results.
  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }
}

/// Ways of selecting papers.
#[derive(Debug, Clone)]
pub enum QueryCriteria {
  /// Papers without a summary, newest first
  Unprocessed {
    /// Maximum number of papers returned
    limit: usize,
  },
  /// The paper with this external id, if any
  ExternalId(String),
  /// Filtered listing, newest first
  Filter(SearchFilter),
}

/// A query for retrieving papers from the database.
#[derive(Debug, Clone)]
pub struct Query {
  /// Selection criteria
  criteria: QueryCriteria,
}

impl Query {
  /// Creates a query with the given criteria.
  pub fn new(criteria: QueryCriteria) -> Self { Self { criteria } }

  /// Up to `limit` unprocessed papers ordered by publication date, newest first.
  pub fn unprocessed(limit: usize) -> Self { Self::new(QueryCriteria::Unprocessed { limit }) }

  /// The paper with the given external id.
  pub fn by_external_id(external_id: &str) -> Self {
    Self::new(QueryCriteria::ExternalId(external_id.to_string()))
  }

  /// A filtered listing.
  pub fn search(filter: SearchFilter) -> Self { Self::new(QueryCriteria::Filter(filter)) }

  /// A single paper joined with its latest summary.
  pub fn with_summary(paper_id: i64) -> WithSummary { WithSummary { paper_id } }

  /// Builds the SQL text and its positional parameters.
  fn build_sql(&self) -> (String, Vec<Value>) {
    match &self.criteria {
      QueryCriteria::Unprocessed { limit } => (
        format!(
          "SELECT {PAPER_COLUMNS} FROM papers p
           WHERE p.processed = 0
           ORDER BY p.published DESC
           LIMIT ?1"
        ),
        vec![Value::Integer(*limit as i64)],
      ),
      QueryCriteria::ExternalId(external_id) => (
        format!("SELECT {PAPER_COLUMNS} FROM papers p WHERE p.external_id = ?1"),
        vec![Value::Text(external_id.clone())],
      ),
      QueryCriteria::Filter(filter) => {
        let mut sql = format!("SELECT {PAPER_COLUMNS} FROM papers p WHERE 1 = 1");
        let mut params = Vec::new();

        if let Some(text) = &filter.text {
          params.push(Value::Text(format!("%{text}%")));
          let n = params.len();
          sql.push_str(&format!(" AND (p.title LIKE ?{n} OR p.abstract_text LIKE ?{n})"));
        }

        if let Some(category) = &filter.category {
          params.push(Value::Text(format!("%{category}%")));
          sql.push_str(&format!(" AND p.categories LIKE ?{}", params.len()));
        }

        if filter.processed_only {
          sql.push_str(" AND p.processed = 1");
        }

        params.push(Value::Integer(filter.limit as i64));
        sql.push_str(&format!(" ORDER BY p.published DESC LIMIT ?{}", params.len()));
        (sql, params)
      },
    }
  }
}

#[async_trait]
impl DatabaseInstruction for Query {
  type Output = Vec<PaperRecord>;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let (sql, params) = self.build_sql();
    trace!("Running query: {sql}");

    let papers = db.conn.call(move |conn| Ok(collect_papers(conn, &sql, params)?)).await?;
    Ok(papers)
  }
}

/// Looks up a paper by row id together with its latest summary.
#[derive(Debug, Clone, Copy)]
pub struct WithSummary {
  /// Row id of the paper
  paper_id: i64,
}

#[async_trait]
impl DatabaseInstruction for WithSummary {
  type Output = Option<PaperWithSummary>;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let paper_id = self.paper_id;
    let sql = format!(
      "SELECT {PAPER_COLUMNS},
              s.id, s.methodology, s.key_contributions, s.extracted_text, s.created_at
       FROM papers p
       LEFT JOIN summaries s
         ON s.id = (SELECT MAX(id) FROM summaries WHERE paper_id = p.id)
       WHERE p.id = ?1"
    );

    let found = db
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let result = stmt.query_row([paper_id], |row| {
          let paper = paper_from_row(row)?;
          let base = PAPER_COLUMN_COUNT;
          let summary = match row.get::<_, Option<i64>>(base)? {
            Some(id) => Some(Summary {
              id,
              paper_id,
              methodology: row.get(base + 1)?,
              key_contributions: row.get(base + 2)?,
              extracted_text: row.get(base + 3)?,
              created_at: timestamp_from_row(row, base + 4)?,
            }),
            None => None,
          };
          Ok(PaperWithSummary { paper, summary })
        });

        match result {
          Ok(found) => Ok(Some(found)),
          Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    Ok(found)
  }
}
