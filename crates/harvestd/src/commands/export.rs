//! Module for the "export" command.

use super::*;

/// Arguments for [`Commands::Export`]
#[derive(Args, Clone)]
pub struct ExportArgs {
  /// Only export papers that reached a terminal state
  #[arg(long)]
  pub processed_only: bool,

  /// Maximum papers to export
  #[arg(long, short, default_value_t = 1000)]
  pub limit: usize,

  /// Also write the collection summary
  #[arg(long, short)]
  pub summary: bool,
}

/// Function for the [`Commands::Export`] in the CLI.
pub async fn export(config: &Config, args: ExportArgs) -> Result<()> {
  let ExportArgs { processed_only, limit, summary } = args;
  let mut db = open_database(config).await?;
  let exporter = MarkdownExporter::new(&config.output_dir)?;

  let mut filter = SearchFilter::default().limit(limit);
  if processed_only {
    filter = filter.processed_only();
  }
  let papers = Query::search(filter).execute(&mut db).await?;

  if papers.is_empty() {
    println!("{} No papers found to export", style(INFO_PREFIX).cyan());
    db.close().await?;
    return Ok(());
  }

  println!("{} Exporting {} papers", style(INFO_PREFIX).cyan(), papers.len());
  let mut entries = Vec::with_capacity(papers.len());
  for id in papers.iter().filter_map(|paper| paper.id) {
    if let Some(entry) = Query::with_summary(id).execute(&mut db).await? {
      entries.push(entry);
    }
  }
  db.close().await?;

  let written = exporter.export_many(&entries)?;
  println!(
    "{} Exported {} papers to {}",
    style(SUCCESS_PREFIX).green(),
    written.len(),
    style(exporter.output_dir().display()).yellow()
  );

  if summary {
    let records: Vec<_> = entries.into_iter().map(|entry| entry.paper).collect();
    let path = exporter.collection_summary(&records)?;
    println!("{} Collection summary written to {}", style(SUCCESS_PREFIX).green(), path.display());
  }
  Ok(())
}
