//! Module for the "search" command: query arXiv and store new papers.

use harvest::search::{ArxivClient, SearchParams};

use super::*;

/// Arguments for [`Commands::Search`]
#[derive(Args, Clone)]
pub struct SearchArgs {
  /// Search keywords, matched against all fields
  #[arg(long, short)]
  pub keywords: Option<String>,

  /// arXiv category, e.g. `quant-ph`
  #[arg(long, short)]
  pub category: Option<String>,

  /// Maximum results to request (defaults to `DEFAULT_MAX_RESULTS`)
  #[arg(long, short)]
  pub max_results: Option<usize>,

  /// Keep papers that fail the category/keyword pre-filter
  #[arg(long)]
  pub no_filter: bool,
}

/// Function for the [`Commands::Search`] in the CLI.
pub async fn search(config: &Config, args: SearchArgs) -> Result<()> {
  let SearchArgs { keywords, category, max_results, no_filter } = args;

  let mut params = SearchParams::default()
    .max_results(max_results.unwrap_or(config.max_results))
    .filter_relevant(config.filter_relevant && !no_filter);
  if let Some(keywords) = keywords {
    params = params.keywords(keywords);
  }
  if let Some(category) = category {
    params = params.category(category);
  }

  let mut pipeline = Pipeline::builder()
    .with_database(open_database(config).await?)
    .with_search(ArxivClient::new())
    .build()?;

  println!("{} Searching arXiv for `{}`", style(INFO_PREFIX).cyan(), style(params.query()).bold());
  let (papers, report) = pipeline.search_and_store(&params).await;

  if papers.is_empty() {
    println!("{} No papers found", style(INFO_PREFIX).cyan());
  } else {
    println!("{} Found {} papers", style(SUCCESS_PREFIX).green(), papers.len());
    for (i, paper) in papers.iter().enumerate() {
      print_paper(paper, i + 1 == papers.len());
    }
  }

  let total = Statistics.execute(pipeline.database()).await?.total;
  println!(
    "\n{} {} new, {} duplicates, {} total in store",
    style(SUCCESS_PREFIX).green(),
    style(report.inserted).green(),
    report.duplicates,
    total
  );
  if report.errors > 0 {
    println!("{} {} papers could not be stored", style(WARNING_PREFIX).yellow(), report.errors);
  }

  pipeline.close().await;
  Ok(())
}
