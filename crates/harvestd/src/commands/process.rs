//! Module for the "process" command: relevance, OCR and summaries for pending papers.

use super::*;

/// Arguments for [`Commands::Process`]
#[derive(Args, Clone)]
pub struct ProcessArgs {
  /// Number of papers to process
  #[arg(long, short, default_value_t = 5)]
  pub batch_size: usize,

  /// Maximum pages to OCR per paper
  #[arg(long, short = 'p', default_value_t = 15)]
  pub max_pages: u32,
}

/// Function for the [`Commands::Process`] in the CLI.
pub async fn process(config: &Config, args: ProcessArgs) -> Result<()> {
  let ProcessArgs { batch_size, max_pages } = args;

  let mut pipeline = Pipeline::builder()
    .with_database(open_database(config).await?)
    .with_exporter(MarkdownExporter::new(&config.output_dir)?)
    .with_config(config)
    .build()?;

  if !pipeline.can_process() {
    pipeline.close().await;
    return Err(HarvestdError::NotConfigured(
      "OCR and summary services must be configured to process papers".to_string(),
    ));
  }

  println!(
    "{} Processing up to {} papers ({} pages each)",
    style(INFO_PREFIX).cyan(),
    batch_size,
    max_pages
  );
  let report = pipeline.process_batch(batch_size, max_pages).await;

  if report.attempted == 0 {
    println!("{} No unprocessed papers found", style(INFO_PREFIX).cyan());
  } else {
    println!("{} Processing summary", style(SUCCESS_PREFIX).green());
    println!("   {} Summarized:   {}", style(ITEM_PREFIX).dim(), style(report.summarized).green());
    println!("   {} Not relevant: {}", style(ITEM_PREFIX).dim(), report.not_relevant);
    println!("   {} Errors:       {}", style(ITEM_PREFIX).dim(), style(report.errors).red());
    println!("   {} Total:        {}", style(LAST_ITEM_PREFIX).dim(), report.attempted);
    if report.summarized > 0 {
      println!(
        "{} Markdown written to {}",
        style(SUCCESS_PREFIX).green(),
        style(config.output_dir.display()).yellow()
      );
    }
  }

  pipeline.close().await;
  Ok(())
}
