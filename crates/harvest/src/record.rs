//! Core record types moved between the search client, the store and the exporters.
//!
//! A [`PaperRecord`] is created from an arXiv feed entry, inserted once into the store, and from
//! then on only ever read. The single mutation the store allows is flipping
//! [`PaperRecord::processed`], and that only happens as a side effect of attaching a
//! [`Summary`].
//!
//! # Examples
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use harvest::record::PaperRecord;
//!
//! let published = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
//! let paper = PaperRecord::new("2403.00001v1", "Qubit routing", "We route qubits.", published)
//!   .with_authors(["Alice", "Bob"])
//!   .with_categories(["quant-ph", "cs.ET"]);
//!
//! assert_eq!(paper.pdf_link, "https://arxiv.org/pdf/2403.00001v1.pdf");
//! assert_eq!(paper.primary_category(), Some("quant-ph"));
//! ```

use super::*;

/// Base for derived PDF links.
pub const PDF_BASE: &str = "https://arxiv.org/pdf/";
/// Base for derived abstract-page links.
pub const ABS_BASE: &str = "https://arxiv.org/abs/";

/// Maximum number of characters of extracted full text kept alongside a summary.
pub const EXTRACTED_TEXT_CAP: usize = 10_000;

/// Metadata for a single paper as returned by the search API and kept in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
  /// Store row id; `None` until the record has been inserted
  pub id:              Option<i64>,
  /// Stable identifier from the search service, e.g. `2403.00001v1`
  pub external_id:     String,
  /// Paper title with feed line-wrapping removed
  pub title:           String,
  /// Abstract with feed line-wrapping removed
  pub abstract_text:   String,
  /// Author names in feed order
  pub authors:         Vec<String>,
  /// Category tags in feed order, primary category first
  pub categories:      Vec<String>,
  /// First publication timestamp
  pub published:       DateTime<Utc>,
  /// Last update timestamp
  pub updated:         DateTime<Utc>,
  /// Direct link to the PDF
  pub pdf_link:        String,
  /// Link to the abstract page
  pub abstract_link:   String,
  /// Whether a summary (or a not-relevant marker) has been stored for this paper
  pub processed:       bool,
  /// Relevance score in `0.0..=1.0`
  pub relevance_score: f64,
  /// When the record was first created locally
  pub created_at:      DateTime<Utc>,
}

impl PaperRecord {
  /// Creates a record with derived links and empty author and category lists.
  pub fn new(
    external_id: &str,
    title: &str,
    abstract_text: &str,
    published: DateTime<Utc>,
  ) -> Self {
    Self {
      id: None,
      external_id: external_id.to_string(),
      title: title.to_string(),
      abstract_text: abstract_text.to_string(),
      authors: Vec::new(),
      categories: Vec::new(),
      published,
      updated: published,
      pdf_link: format!("{PDF_BASE}{external_id}.pdf"),
      abstract_link: format!("{ABS_BASE}{external_id}"),
      processed: false,
      relevance_score: 0.0,
      created_at: Utc::now(),
    }
  }

  /// Replaces the author list.
  pub fn with_authors<I, S>(mut self, authors: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>, {
    self.authors = authors.into_iter().map(Into::into).collect();
    self
  }

  /// Replaces the category list.
  pub fn with_categories<I, S>(mut self, categories: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>, {
    self.categories = categories.into_iter().map(Into::into).collect();
    self
  }

  /// Sets the last-updated timestamp.
  pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
    self.updated = updated;
    self
  }

  /// First listed category, which arXiv reports as the primary one.
  pub fn primary_category(&self) -> Option<&str> { self.categories.first().map(String::as_str) }
}

/// Derived analysis attached to a paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
  /// Store row id
  pub id:                i64,
  /// Row id of the parent [`PaperRecord`]
  pub paper_id:          i64,
  /// Structured methodology summary
  pub methodology:       String,
  /// Bullet list of key contributions
  pub key_contributions: String,
  /// OCR text, capped at [`EXTRACTED_TEXT_CAP`] characters
  pub extracted_text:    Option<String>,
  /// When the summary was stored
  pub created_at:        DateTime<Utc>,
}

/// A paper together with its latest summary, if one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperWithSummary {
  /// The paper itself
  pub paper:   PaperRecord,
  /// Latest summary, `None` while the paper is unprocessed
  pub summary: Option<Summary>,
}

impl PaperWithSummary {
  /// True when the paper reached the summarized terminal state rather than the not-relevant one.
  pub fn is_relevant_summary(&self) -> bool {
    self.summary.as_ref().is_some_and(|s| s.methodology != summarize::NOT_RELEVANT)
  }
}

/// One entry in the append-only search audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchLogEntry {
  /// Store row id
  pub id:           i64,
  /// Query string as sent to the search service
  pub query:        String,
  /// Category filter, if the search was category-scoped
  pub category:     Option<String>,
  /// Number of new-to-this-session records returned
  pub result_count: usize,
  /// When the search ran
  pub searched_at:  DateTime<Utc>,
}

/// Cuts `text` to at most `cap` characters without splitting a code point.
pub fn truncate_chars(text: &str, cap: usize) -> &str {
  match text.char_indices().nth(cap) {
    Some((idx, _)) => &text[..idx],
    None => text,
  }
}
