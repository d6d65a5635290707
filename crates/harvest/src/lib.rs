//! arXiv paper harvesting, filtering, OCR and summarization pipeline.
//!
//! `harvest` collects paper metadata from the arXiv search API, keeps it in a local SQLite
//! store, and works through the stored papers one at a time:
//!
//! - Search arXiv by category and keyword, dropping papers already seen in this session
//! - Pre-filter results with a cheap category/keyword heuristic
//! - Persist new papers, treating duplicates as "already known"
//! - Ask a language model whether each paper is actually on topic
//! - OCR the PDF of relevant papers page by page through a vision model
//! - Summarize methodology and key contributions, store them, export markdown
//! - Answer research questions across the summarized collection
//!
//! Every external call is awaited in sequence; there is no parallelism across papers, pages, or
//! requests. External failures degrade to empty or sentinel results instead of aborting a batch.
//!
//! # Getting Started
//!
//! ```no_run
//! use harvest::{
//!   configuration::Config,
//!   database::Database,
//!   export::MarkdownExporter,
//!   pipeline::{Pipeline, SearchPlan},
//!   search::ArxivClient,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = Config::load()?;
//!   let database = Database::open(&config.database_path).await?;
//!
//!   let mut pipeline = Pipeline::builder()
//!     .with_database(database)
//!     .with_search(ArxivClient::new())
//!     .with_exporter(MarkdownExporter::new(&config.output_dir)?)
//!     .with_config(&config)
//!     .build()?;
//!
//!   pipeline.ingest(&SearchPlan::default()).await;
//!   let report = pipeline.process_batch(5, 15).await;
//!   println!("{report:?}");
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`record`]: Paper, summary and search-log types
//! - [`search`]: arXiv search client with session dedup and relevance pre-filter
//! - [`database`]: SQLite store expressed as database instructions
//! - [`extract`]: PDF page rendering and OCR
//! - [`llm`]: OpenAI-compatible chat completion requests
//! - [`summarize`]: Relevance scoring and paper summaries built on [`llm`]
//! - [`export`]: Markdown rendering of stored papers
//! - [`pipeline`]: Search → store and store → OCR → summarize → store → export orchestration
//! - [`research`]: Questions, comparisons and trend analysis over the summarized papers
//! - [`scheduler`]: Fixed-interval cycle runner with cooperative shutdown
//! - [`configuration`]: File and environment configuration

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::{BTreeMap, HashSet},
  fmt::Display,
  path::{Path, PathBuf},
  time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
use url::Url;
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod configuration;
pub mod database;
pub mod error;
pub mod export;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod record;
pub mod research;
pub mod scheduler;
pub mod search;
pub mod summarize;

use crate::{error::*, record::*};

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use harvest::{database::Database, prelude::*};
///
/// async fn example() -> Result<(), HarvestError> {
///   let mut db = Database::open(Database::default_path()).await?;
///   let stats = harvest::database::Statistics.execute(&mut db).await?;
///   println!("{} papers", stats.total);
///   Ok(())
/// }
/// ```
pub mod prelude {
  pub use crate::{
    database::DatabaseInstruction, error::HarvestError, extract::Extract, search::PaperSearch,
    summarize::Summarize,
  };
}
