//! Module for the "stats" command.

use super::*;

/// Arguments for [`Commands::Stats`]
#[derive(Args, Clone)]
pub struct StatsArgs {
  /// Also list the N most recently published papers
  #[arg(long, short)]
  pub recent: Option<usize>,

  /// Also list the N most recent searches
  #[arg(long)]
  pub searches: Option<usize>,
}

/// Function for the [`Commands::Stats`] in the CLI.
pub async fn stats(config: &Config, args: StatsArgs) -> Result<()> {
  let mut db = open_database(config).await?;
  let stats = Statistics.execute(&mut db).await?;

  println!("{} Store statistics", style(INFO_PREFIX).cyan());
  println!("   {} Total papers: {}", style(ITEM_PREFIX).dim(), style(stats.total).bold());
  println!("   {} Processed:    {}", style(ITEM_PREFIX).dim(), style(stats.processed).green());
  println!("   {} Unprocessed:  {}", style(ITEM_PREFIX).dim(), style(stats.unprocessed).yellow());
  println!("   {} Last 7 days:  {}", style(LAST_ITEM_PREFIX).dim(), stats.last_7_days);

  if !stats.by_category.is_empty() {
    println!("\n{} By primary category", style(INFO_PREFIX).cyan());
    let count = stats.by_category.len();
    for (i, (category, n)) in stats.by_category.iter().enumerate() {
      let branch = if i + 1 == count { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
      println!("   {} {category}: {n}", style(branch).dim());
    }
  }

  println!("\n{} Database path:   {}", style(INFO_PREFIX).cyan(), config.database_path.display());
  println!("{} Markdown output: {}", style(INFO_PREFIX).cyan(), config.output_dir.display());

  if let Some(limit) = args.recent {
    let recent = Query::search(SearchFilter::default().limit(limit)).execute(&mut db).await?;
    println!("\n{} Recent papers", style(INFO_PREFIX).cyan());
    for (i, paper) in recent.iter().enumerate() {
      print_paper(paper, i + 1 == recent.len());
    }
  }

  if let Some(limit) = args.searches {
    let history = SearchHistory { limit }.execute(&mut db).await?;
    println!("\n{} Recent searches", style(INFO_PREFIX).cyan());
    for (i, entry) in history.iter().enumerate() {
      let branch = if i + 1 == history.len() { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
      println!(
        "   {} {} `{}` → {} results",
        style(branch).dim(),
        entry.searched_at.format("%Y-%m-%d %H:%M"),
        entry.query,
        entry.result_count
      );
    }
  }

  db.close().await?;
  Ok(())
}
