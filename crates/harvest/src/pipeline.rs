//! Orchestration: search → store, and store → relevance → OCR → summarize → store → export.
//!
//! Each paper moves through a small state machine:
//!
//! ```text
//! Unprocessed ──relevance──▶ NotRelevant                     (terminal, processed)
//!      │
//!      └──────────────────▶ Relevant ─extract─▶ Extracted ─summarize─▶ Summarized (terminal)
//! ```
//!
//! Only the two terminal states are persisted, each by attaching a summary, which also flips the
//! paper's `processed` flag. A failure anywhere before that leaves the paper unprocessed so a
//! later batch retries it. Papers are handled strictly one at a time.

use super::*;
use crate::{
  configuration::Config,
  database::{
    Add, AddOutcome, Database, DatabaseInstruction, LogSearch, Query, SearchFilter, Statistics,
  },
  export::MarkdownExporter,
  extract::{full_text, Extract, OcrExtractor, PdfSource},
  scheduler::Cycle,
  search::{ArxivClient, PaperSearch, SearchParams},
  summarize::{
    LlmSummarizer, Summarize, DEFAULT_THRESHOLD, NOT_RELEVANT, NOT_RELEVANT_CONTRIBUTIONS,
  },
};

/// Upper bound on papers gathered for a collection export.
const COLLECTION_LIMIT: usize = 1000;

/// Which searches one ingestion pass runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
  /// One category-scoped search each
  pub categories:            Vec<String>,
  /// One keyword search each
  pub keywords:              Vec<String>,
  /// Page size of every search
  pub max_results_per_query: usize,
  /// Apply the topical pre-filter
  pub filter_relevant:       bool,
}

impl Default for SearchPlan {
  fn default() -> Self { Self::from_config(&Config::default()) }
}

impl SearchPlan {
  /// The crawler's configured searches.
  pub fn from_config(config: &Config) -> Self {
    Self {
      categories:            config.crawl.categories.clone(),
      keywords:              config.crawl.keywords.clone(),
      max_results_per_query: config.crawl.max_results_per_query,
      filter_relevant:       config.filter_relevant,
    }
  }

  /// Parameters of every search in the plan, categories first.
  pub fn searches(&self) -> Vec<SearchParams> {
    let base = SearchParams::default()
      .max_results(self.max_results_per_query)
      .filter_relevant(self.filter_relevant);
    let by_category = self.categories.iter().map(|c| base.clone().category(c.as_str()));
    let by_keyword = self.keywords.iter().map(|k| base.clone().keywords(k.as_str()));
    by_category.chain(by_keyword).collect()
  }
}

/// Tunables that do not belong to any single client.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
  /// Relevance score a paper needs to be OCR'd and summarized
  pub threshold:  f64,
  /// Searches run by every crawl cycle
  pub plan:       SearchPlan,
  /// Papers processed per crawl cycle
  pub batch_size: usize,
  /// Pages OCR'd per paper
  pub max_pages:  u32,
}

impl Default for PipelineSettings {
  fn default() -> Self { Self::from_config(&Config::default()) }
}

impl PipelineSettings {
  /// Settings taken from `config`.
  pub fn from_config(config: &Config) -> Self {
    Self {
      threshold:  DEFAULT_THRESHOLD,
      plan:       SearchPlan::from_config(config),
      batch_size: config.crawl.batch_size,
      max_pages:  config.max_pages,
    }
  }
}

/// Counts from one or more searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
  /// Searches run
  pub searches:   usize,
  /// Records returned by the search client
  pub found:      usize,
  /// Records that were new to the store
  pub inserted:   usize,
  /// Records the store already had
  pub duplicates: usize,
  /// Store failures
  pub errors:     usize,
}

impl std::ops::AddAssign for IngestReport {
  fn add_assign(&mut self, other: Self) {
    self.searches += other.searches;
    self.found += other.found;
    self.inserted += other.inserted;
    self.duplicates += other.duplicates;
    self.errors += other.errors;
  }
}

/// Outcome of one processing batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
  /// Papers pulled from the store
  pub attempted:    usize,
  /// Papers that reached the summarized state
  pub summarized:   usize,
  /// Papers judged not relevant
  pub not_relevant: usize,
  /// Papers left unprocessed because something failed
  pub errors:       usize,
}

impl BatchReport {
  /// Papers that reached a terminal state.
  pub fn completed(&self) -> usize { self.summarized + self.not_relevant }
}

/// Terminal state reached by one paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaperOutcome {
  /// Stored with the not-relevant marker
  NotRelevant,
  /// Stored with a real summary
  Summarized,
}

/// Running totals for the lifetime of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
  /// Searches run
  pub searches:         usize,
  /// New papers stored
  pub papers_found:     usize,
  /// Papers summarized
  pub papers_processed: usize,
  /// Failures of any kind
  pub errors:           usize,
  /// When the pipeline was built
  pub started_at:       DateTime<Utc>,
}

impl Default for CrawlStats {
  fn default() -> Self {
    Self { searches: 0, papers_found: 0, papers_processed: 0, errors: 0, started_at: Utc::now() }
  }
}

impl Display for CrawlStats {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let runtime = Utc::now().signed_duration_since(self.started_at);
    let secs = runtime.num_seconds().max(0);
    write!(
      f,
      "runtime {:02}:{:02}:{:02}, {} searches, {} papers found, {} processed, {} errors",
      secs / 3600,
      (secs % 3600) / 60,
      secs % 60,
      self.searches,
      self.papers_found,
      self.papers_processed,
      self.errors
    )
  }
}

/// The assembled pipeline. Owns the store connection for its whole lifetime.
pub struct Pipeline {
  /// Paper store
  database:   Database,
  /// Source of new papers
  search:     Box<dyn PaperSearch>,
  /// OCR capability, absent when not configured
  extractor:  Option<Box<dyn Extract>>,
  /// Language model capability, absent when not configured
  summarizer: Option<Box<dyn Summarize>>,
  /// Markdown output, absent when exports are disabled
  exporter:   Option<MarkdownExporter>,
  /// Tunables
  settings:   PipelineSettings,
  /// Running totals
  stats:      CrawlStats,
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
  /// Paper store; required
  database:   Option<Database>,
  /// Search client; defaults to [`ArxivClient`]
  search:     Option<Box<dyn PaperSearch>>,
  /// OCR capability
  extractor:  Option<Box<dyn Extract>>,
  /// Language model capability
  summarizer: Option<Box<dyn Summarize>>,
  /// Markdown output
  exporter:   Option<MarkdownExporter>,
  /// Tunables
  settings:   PipelineSettings,
}

impl PipelineBuilder {
  /// Sets the store.
  pub fn with_database(mut self, database: Database) -> Self {
    self.database = Some(database);
    self
  }

  /// Sets the search client.
  pub fn with_search(mut self, search: impl PaperSearch + 'static) -> Self {
    self.search = Some(Box::new(search));
    self
  }

  /// Sets the OCR capability.
  pub fn with_extractor(mut self, extractor: impl Extract + 'static) -> Self {
    self.extractor = Some(Box::new(extractor));
    self
  }

  /// Sets the language model capability.
  pub fn with_summarizer(mut self, summarizer: impl Summarize + 'static) -> Self {
    self.summarizer = Some(Box::new(summarizer));
    self
  }

  /// Sets the markdown exporter.
  pub fn with_exporter(mut self, exporter: MarkdownExporter) -> Self {
    self.exporter = Some(exporter);
    self
  }

  /// Replaces the tunables.
  pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
    self.settings = settings;
    self
  }

  /// Takes tunables from `config` and builds whichever clients it has credentials for.
  ///
  /// Clients already set explicitly are kept. A capability without credentials is left out with
  /// a warning; the pipeline then only collects papers.
  pub fn with_config(mut self, config: &Config) -> Self {
    self.settings = PipelineSettings::from_config(config);

    if self.extractor.is_none() {
      match config.ocr_service().map(|service| OcrExtractor::new(service, config.ocr_dpi)) {
        Some(Ok(extractor)) => self.extractor = Some(Box::new(extractor)),
        Some(Err(e)) => warn!("OCR disabled: {e}"),
        None => warn!("OCR disabled: OCR_API_KEY or OCR_BASE_URL not set"),
      }
    }

    if self.summarizer.is_none() {
      match config.summary_service().map(LlmSummarizer::new) {
        Some(Ok(summarizer)) => self.summarizer = Some(Box::new(summarizer)),
        Some(Err(e)) => warn!("Summarization disabled: {e}"),
        None => warn!("Summarization disabled: SUMMARY_API_KEY or SUMMARY_BASE_URL not set"),
      }
    }

    self
  }

  /// Assembles the pipeline.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::Config`] when no database was supplied.
  pub fn build(self) -> Result<Pipeline> {
    let database = self
      .database
      .ok_or_else(|| HarvestError::Config("pipeline needs a database".to_string()))?;

    Ok(Pipeline {
      database,
      search: self.search.unwrap_or_else(|| Box::new(ArxivClient::new())),
      extractor: self.extractor,
      summarizer: self.summarizer,
      exporter: self.exporter,
      settings: self.settings,
      stats: CrawlStats::default(),
    })
  }
}

impl Pipeline {
  /// Starts building a pipeline.
  pub fn builder() -> PipelineBuilder { PipelineBuilder::default() }

  /// Running totals.
  pub fn stats(&self) -> &CrawlStats { &self.stats }

  /// The store, for ad-hoc instructions.
  pub fn database(&mut self) -> &mut Database { &mut self.database }

  /// Whether both the OCR and the language model capability are present.
  pub fn can_process(&self) -> bool { self.extractor.is_some() && self.summarizer.is_some() }

  /// Runs one search, stores new papers and appends to the search log.
  ///
  /// Returns the records the search client produced along with the counts.
  pub async fn search_and_store(
    &mut self,
    params: &SearchParams,
  ) -> (Vec<PaperRecord>, IngestReport) {
    let query = params.query();
    info!("Searching `{query}`");

    let papers = self.search.search(params).await;
    let mut report = IngestReport { searches: 1, found: papers.len(), ..Default::default() };

    for paper in &papers {
      match Add::paper(paper).execute(&mut self.database).await {
        Ok(AddOutcome::Inserted(_)) => report.inserted += 1,
        Ok(AddOutcome::Duplicate) => report.duplicates += 1,
        Err(e) => {
          error!("Could not store {}: {e}", paper.external_id);
          report.errors += 1;
        },
      }
    }

    let log = LogSearch::new(&query, params.category.as_deref(), papers.len());
    if let Err(e) = log.execute(&mut self.database).await {
      error!("Could not record search `{query}`: {e}");
      report.errors += 1;
    }

    info!("Found {} papers, {} new", report.found, report.inserted);
    self.stats.searches += report.searches;
    self.stats.papers_found += report.inserted;
    self.stats.errors += report.errors;
    (papers, report)
  }

  /// Runs every search in `plan`, categories first, then keywords.
  pub async fn ingest(&mut self, plan: &SearchPlan) -> IngestReport {
    info!(
      "Starting search: {} categories, {} keywords",
      plan.categories.len(),
      plan.keywords.len()
    );

    let mut report = IngestReport::default();
    for params in plan.searches() {
      report += self.search_and_store(&params).await.1;
    }

    info!("Search complete: {} new papers added to the store", report.inserted);
    report
  }

  /// Moves up to `batch_size` unprocessed papers to a terminal state.
  ///
  /// Never fails: every per-paper problem is logged and counted in [`BatchReport::errors`], and
  /// the paper stays unprocessed. When at least one paper was summarized the collection export
  /// is regenerated.
  pub async fn process_batch(&mut self, batch_size: usize, max_pages: u32) -> BatchReport {
    let mut report = BatchReport::default();

    let (Some(extractor), Some(summarizer)) = (self.extractor.as_deref(), self.summarizer.as_deref())
    else {
      warn!("OCR or summarization not configured, skipping processing");
      return report;
    };

    let papers = match Query::unprocessed(batch_size).execute(&mut self.database).await {
      Ok(papers) => papers,
      Err(e) => {
        error!("Could not read unprocessed papers: {e}");
        report.errors += 1;
        self.stats.errors += 1;
        return report;
      },
    };

    if papers.is_empty() {
      info!("No unprocessed papers found");
      return report;
    }

    report.attempted = papers.len();
    info!("Processing {} papers", papers.len());

    for (i, paper) in papers.iter().enumerate() {
      info!("[{}/{}] {}", i + 1, papers.len(), truncate_chars(&paper.title, 60));

      let outcome = process_paper(
        &mut self.database,
        extractor,
        summarizer,
        self.exporter.as_ref(),
        self.settings.threshold,
        paper,
        max_pages,
      )
      .await;

      match outcome {
        Ok(PaperOutcome::Summarized) => report.summarized += 1,
        Ok(PaperOutcome::NotRelevant) => report.not_relevant += 1,
        Err(e) => {
          error!("Error processing {}: {e}", paper.external_id);
          report.errors += 1;
        },
      }
    }

    info!(
      "Processing batch complete: {} summarized, {} not relevant, {} errors",
      report.summarized, report.not_relevant, report.errors
    );
    self.stats.papers_processed += report.summarized;
    self.stats.errors += report.errors;

    if report.summarized > 0 {
      match self.export_collection().await {
        Ok(count) => info!("Collection summary updated ({count} papers)"),
        Err(e) => {
          error!("Could not update collection summary: {e}");
          self.stats.errors += 1;
        },
      }
    }

    report
  }

  /// Rewrites the index and collection summary from every summarized, relevant paper.
  ///
  /// Returns how many papers were included; `0` without an exporter.
  pub async fn export_collection(&mut self) -> Result<usize> {
    let Some(exporter) = self.exporter.as_ref() else {
      return Ok(0);
    };

    let processed = Query::search(SearchFilter::default().processed_only().limit(COLLECTION_LIMIT))
      .execute(&mut self.database)
      .await?;

    let mut relevant = Vec::new();
    for paper in processed.iter().filter_map(|p| p.id) {
      if let Some(entry) = Query::with_summary(paper).execute(&mut self.database).await? {
        if entry.is_relevant_summary() {
          relevant.push(entry);
        }
      }
    }

    if relevant.is_empty() {
      return Ok(0);
    }

    let papers: Vec<PaperRecord> = relevant.iter().map(|entry| entry.paper.clone()).collect();
    exporter.collection_summary(&papers)?;
    exporter.index(&relevant)?;
    Ok(relevant.len())
  }

  /// Logs running totals and a fresh store snapshot.
  pub async fn log_statistics(&mut self) {
    info!("Crawler statistics: {}", self.stats);
    match Statistics.execute(&mut self.database).await {
      Ok(store) => info!(
        "Store statistics: {} total, {} processed, {} unprocessed, {} in the last 7 days",
        store.total, store.processed, store.unprocessed, store.last_7_days
      ),
      Err(e) => error!("Could not read store statistics: {e}"),
    }
  }

  /// Logs final statistics and closes the store.
  pub async fn close(mut self) {
    self.log_statistics().await;
    if let Err(e) = self.database.close().await {
      error!("Could not close the store cleanly: {e}");
    }
  }
}

/// Drives one paper from unprocessed to a terminal state.
async fn process_paper(
  database: &mut Database,
  extractor: &dyn Extract,
  summarizer: &dyn Summarize,
  exporter: Option<&MarkdownExporter>,
  threshold: f64,
  paper: &PaperRecord,
  max_pages: u32,
) -> Result<PaperOutcome> {
  let paper_id = paper.id.ok_or_else(|| {
    HarvestError::Config(format!("{} was not read from the store", paper.external_id))
  })?;

  let relevance = summarizer.relevance(paper, threshold).await;
  if !relevance.is_relevant {
    info!("Not relevant (score {:.2})", relevance.score);
    Add::summary(paper_id, NOT_RELEVANT, NOT_RELEVANT_CONTRIBUTIONS)
      .with_relevance_score(relevance.score)
      .execute(database)
      .await?;
    return Ok(PaperOutcome::NotRelevant);
  }

  debug!("OCRing {} (max {max_pages} pages)", paper.pdf_link);
  let pages = extractor.extract(&PdfSource::Url(paper.pdf_link.clone()), max_pages).await?;
  let text = full_text(&pages);
  debug!("Extracted {} characters", text.len());

  let methodology = summarizer.methodology(&text, paper).await;
  let contributions = summarizer.key_contributions(&text, paper).await;

  Add::summary(paper_id, &methodology, &contributions)
    .with_extracted_text(&text)
    .with_relevance_score(relevance.score)
    .execute(database)
    .await?;

  if let Some(exporter) = exporter {
    match exporter.export_paper(paper, Some(&methodology), Some(&contributions), Some(&relevance)) {
      Ok(path) => info!("Processed and exported to {}", path.display()),
      Err(e) => warn!("Summary stored but export of {} failed: {e}", paper.external_id),
    }
  }

  Ok(PaperOutcome::Summarized)
}

#[async_trait]
impl Cycle for Pipeline {
  async fn run_cycle(&mut self) {
    info!("Starting crawl cycle");

    let plan = self.settings.plan.clone();
    let ingest = self.ingest(&plan).await;

    let pending = match Statistics.execute(&mut self.database).await {
      Ok(store) => store.unprocessed,
      Err(e) => {
        error!("Could not read store statistics: {e}");
        self.stats.errors += 1;
        0
      },
    };

    if ingest.inserted > 0 || pending > 0 {
      let (batch_size, max_pages) = (self.settings.batch_size, self.settings.max_pages);
      self.process_batch(batch_size, max_pages).await;
    }

    self.log_statistics().await;
    info!("Crawl cycle complete");
  }

  async fn shutdown(self) { self.close().await; }
}
