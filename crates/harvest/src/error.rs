//! Error types for the harvest library.
//!
//! Most of the pipeline deliberately swallows failures at the client boundary (a failed search
//! returns no papers, a failed OCR page returns empty text, a failed summary returns a sentinel
//! string). The errors here are the ones that are allowed to travel: store failures, whole-document
//! extraction failures, and configuration problems.
//!
//! # Examples
//!
//! ```no_run
//! use harvest::{database::Database, error::HarvestError};
//!
//! # async fn example() -> Result<(), HarvestError> {
//! match Database::open("papers.db").await {
//!   Ok(_db) => println!("store ready"),
//!   Err(HarvestError::AsyncSqlite(e)) => println!("could not open store: {e}"),
//!   Err(e) => println!("other error: {e}"),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Error type alias used for the [`harvest`](crate) crate.
pub type Result<T> = core::result::Result<T, HarvestError>;

/// Errors that can occur while harvesting, storing or processing papers.
#[derive(Error, Debug)]
pub enum HarvestError {
  /// A network request failed.
  ///
  /// This can occur when:
  /// - The network is unavailable
  /// - The server is unreachable or returns an error status
  /// - The request times out
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// An external API answered, but with something we could not use.
  ///
  /// The string carries the reason for debugging.
  #[error("API error: {0}")]
  ApiError(String),

  /// The arXiv feed could not be deserialized at all.
  #[error("Failed to parse feed: {0}")]
  Feed(String),

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  ///
  /// This wraps errors from the `tokio-rusqlite` crate, which is how every instruction reaches
  /// the connection.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Path(#[from] std::io::Error),

  /// A JSON column (authors, categories) could not be encoded or decoded.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// PDF parsing failed before any page could be rendered.
  ///
  /// Common causes are truncated downloads, HTML error pages saved as `.pdf`, and encrypted
  /// documents.
  #[error(transparent)]
  Lopdf(#[from] lopdf::Error),

  /// Rendering a page to an image failed.
  #[error("Failed to render page {page}: {reason}")]
  Render {
    /// 1-based page index
    page:   u32,
    /// What the renderer reported
    reason: String,
  },

  /// A model was not specified for the LLM request.
  #[error("No model was chosen for the LLM.")]
  LLMMissingModel,

  /// No messages were supplied in the LLM request.
  #[error("No messages were supplied to send to the LLM.")]
  LLMMissingMessage,

  /// The summary was requested for a paper id the store does not know.
  #[error("No paper with id {0} in the database")]
  UnknownPaper(i64),

  /// A research task had nothing to work with, such as no summarized papers matching its filter.
  #[error("{0}")]
  Research(String),

  /// A TOML configuration file could not be parsed.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// A TOML configuration could not be written.
  #[error(transparent)]
  TomlSer(#[from] toml::ser::Error),

  /// Any other configuration problem.
  #[error("{0}")]
  Config(String),
}
