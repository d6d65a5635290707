//! Insert instructions for papers and summaries.

use rusqlite::{ffi, params, ErrorCode};

use super::*;

/// Result of inserting a paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
  /// The paper was new and now lives under this row id
  Inserted(i64),
  /// A paper with the same external id is already stored; nothing was written
  Duplicate,
}

impl AddOutcome {
  /// Row id of a freshly inserted paper.
  pub fn id(&self) -> Option<i64> {
    match self {
      Self::Inserted(id) => Some(*id),
      Self::Duplicate => None,
    }
  }
}

/// Inserts a paper record.
///
/// Duplicates are detected by the `UNIQUE` constraint on `external_id`, so there is no window
/// between checking and inserting.
#[derive(Debug)]
pub struct Add<'a> {
  /// Paper to insert
  paper: &'a PaperRecord,
}

impl<'a> Add<'a> {
  /// Creates an instruction that inserts `paper`.
  pub fn paper(paper: &'a PaperRecord) -> Self { Self { paper } }

  /// Creates an instruction that attaches a summary to the paper with row id `paper_id`.
  pub fn summary(
    paper_id: i64,
    methodology: &'a str,
    key_contributions: &'a str,
  ) -> AddSummary<'a> {
    AddSummary {
      paper_id,
      methodology,
      key_contributions,
      extracted_text: None,
      relevance_score: None,
    }
  }
}

#[async_trait]
impl DatabaseInstruction for Add<'_> {
  type Output = AddOutcome;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let authors = serde_json::to_string(&self.paper.authors)?;
    let categories = serde_json::to_string(&self.paper.categories)?;
    let external_id = self.paper.external_id.clone();
    let title = self.paper.title.clone();
    let abstract_text = self.paper.abstract_text.clone();
    let published = to_sql_timestamp(&self.paper.published);
    let updated = to_sql_timestamp(&self.paper.updated);
    let pdf_link = self.paper.pdf_link.clone();
    let abstract_link = self.paper.abstract_link.clone();
    let relevance_score = self.paper.relevance_score;

    let outcome = db
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let inserted = tx.execute(
          "INSERT INTO papers (
             external_id, title, abstract_text, authors, categories,
             published, updated, pdf_link, abstract_link, relevance_score
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          params![
            external_id,
            title,
            abstract_text,
            authors,
            categories,
            published,
            updated,
            pdf_link,
            abstract_link,
            relevance_score,
          ],
        );

        match inserted {
          Ok(_) => {
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(AddOutcome::Inserted(id))
          },
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
              && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            Ok(AddOutcome::Duplicate),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    match outcome {
      AddOutcome::Inserted(id) => trace!("Inserted {} as row {id}", self.paper.external_id),
      AddOutcome::Duplicate => debug!("{} already stored", self.paper.external_id),
    }
    Ok(outcome)
  }
}

/// Inserts a summary and marks its parent paper processed in the same transaction.
#[derive(Debug)]
pub struct AddSummary<'a> {
  /// Row id of the parent paper
  paper_id:          i64,
  /// Methodology text
  methodology:       &'a str,
  /// Key contributions text
  key_contributions: &'a str,
  /// Extracted text, capped on write
  extracted_text:    Option<&'a str>,
  /// Relevance score written back to the paper
  relevance_score:   Option<f64>,
}

impl<'a> AddSummary<'a> {
  /// Stores up to [`EXTRACTED_TEXT_CAP`] characters of `text` with the summary.
  pub fn with_extracted_text(mut self, text: &'a str) -> Self {
    self.extracted_text = Some(text);
    self
  }

  /// Records the relevance score on the paper in the same transaction.
  pub fn with_relevance_score(mut self, score: f64) -> Self {
    self.relevance_score = Some(score);
    self
  }
}

#[async_trait]
impl DatabaseInstruction for AddSummary<'_> {
  type Output = i64;

  async fn execute(&self, db: &mut Database) -> Result<Self::Output> {
    let paper_id = self.paper_id;
    let methodology = self.methodology.to_string();
    let key_contributions = self.key_contributions.to_string();
    let extracted_text =
      self.extracted_text.map(|text| truncate_chars(text, EXTRACTED_TEXT_CAP).to_string());
    let relevance_score = self.relevance_score;

    let summary_id = db
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let updated = tx.execute(
          "UPDATE papers
           SET processed = 1, relevance_score = COALESCE(?2, relevance_score)
           WHERE id = ?1",
          params![paper_id, relevance_score],
        )?;
        if updated == 0 {
          // Dropping the transaction rolls it back.
          return Ok(None);
        }

        tx.execute(
          "INSERT INTO summaries (paper_id, methodology, key_contributions, extracted_text)
           VALUES (?1, ?2, ?3, ?4)",
          params![paper_id, methodology, key_contributions, extracted_text],
        )?;
        let summary_id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(Some(summary_id))
      })
      .await?;

    summary_id.ok_or(HarvestError::UnknownPaper(paper_id))
  }
}
