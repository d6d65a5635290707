use super::*;

pub mod config;
pub mod crawl;
pub mod export;
pub mod ocr;
pub mod process;
pub mod research;
pub mod search;
pub mod stats;

pub use config::{show_config, ConfigArgs};
pub use crawl::{crawl, CrawlArgs};
pub use export::{export, ExportArgs};
pub use ocr::{ocr, OcrArgs};
pub use process::{process, ProcessArgs};
pub use research::{
  compare, connections, custom, research, trends, CompareArgs, ConnectionsArgs, CustomArgs,
  ResearchArgs, TrendsArgs,
};
pub use search::{search, SearchArgs};
pub use stats::{stats, StatsArgs};

/// Available commands for the CLI
#[derive(Subcommand, Clone)]
pub enum Commands {
  /// Search arXiv and add new papers to the store
  Search(SearchArgs),

  /// Relevance-check, OCR and summarize unprocessed papers
  Process(ProcessArgs),

  /// Search and process on a fixed interval until interrupted
  Crawl(CrawlArgs),

  /// Show store statistics
  Stats(StatsArgs),

  /// Show the effective configuration
  Config(ConfigArgs),

  /// Export stored papers to markdown
  Export(ExportArgs),

  /// OCR a PDF file or URL into a markdown file
  Ocr(OcrArgs),

  /// Answer a research question from the summarized papers
  Research(ResearchArgs),

  /// Compare summarized papers on a topic along named aspects
  Compare(CompareArgs),

  /// Analyze research trends across summarized papers
  Trends(TrendsArgs),

  /// Relate one summarized paper to the rest of the collection
  Connections(ConnectionsArgs),

  /// Run a free-form research instruction over summarized papers
  Custom(CustomArgs),
}

/// Opens the store named by `config`.
async fn open_database(config: &Config) -> Result<Database> {
  debug!("Opening store at {}", config.database_path.display());
  Ok(Database::open(&config.database_path).await?)
}

/// Prints the configuration problems, if any, as warnings.
fn print_warnings(config: &Config) {
  let problems = config.validate();
  if problems.is_empty() {
    return;
  }
  println!("{} Configuration warnings:", style(WARNING_PREFIX).yellow());
  for (i, problem) in problems.iter().enumerate() {
    let branch = if i + 1 == problems.len() { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
    println!("   {} {}", style(branch).dim(), problem);
  }
}

/// Prints one paper as a list line.
fn print_paper(paper: &harvest::record::PaperRecord, last: bool) {
  let branch = if last { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
  let status = if paper.processed { style("✓").green() } else { style("·").dim() };
  println!(
    "   {} {} [{}] {}",
    style(branch).dim(),
    status,
    style(&paper.external_id).yellow(),
    truncate_chars(&paper.title, 60)
  );
}
