//! Module for the "crawl" command: the long-running search and process loop.

use harvest::scheduler::{Cycle, Scheduler};

use super::*;

/// Arguments for [`Commands::Crawl`]
#[derive(Args, Clone)]
pub struct CrawlArgs {
  /// Hours between crawl cycles (defaults to the configured interval)
  #[arg(long, short)]
  pub interval: Option<f64>,

  /// Run a single cycle and exit
  #[arg(long)]
  pub once: bool,
}

/// Function for the [`Commands::Crawl`] in the CLI.
pub async fn crawl(config: &Config, args: CrawlArgs) -> Result<()> {
  let interval = args.interval.unwrap_or(config.crawl.interval_hours);
  if !interval.is_finite() || interval <= 0.0 {
    return Err(HarvestdError::InvalidArgument(format!(
      "interval must be a positive number of hours, got {interval}"
    )));
  }

  print_warnings(config);

  let mut pipeline = Pipeline::builder()
    .with_database(open_database(config).await?)
    .with_exporter(MarkdownExporter::new(&config.output_dir)?)
    .with_config(config)
    .build()?;

  if !pipeline.can_process() {
    println!(
      "{} OCR or summarization not configured, papers will only be collected",
      style(WARNING_PREFIX).yellow()
    );
  }

  if args.once {
    println!("{} Running a single crawl cycle", style(INFO_PREFIX).cyan());
    pipeline.run_cycle().await;
    let stats = pipeline.stats().clone();
    pipeline.shutdown().await;
    println!("{} Crawl cycle complete: {stats}", style(SUCCESS_PREFIX).green());
    return Ok(());
  }

  let scheduler =
    Scheduler::every_hours(interval).with_run_immediately(config.crawl.run_immediately);
  tokio::spawn(scheduler.shutdown_handle().listen_for_signals());

  println!(
    "{} Crawling every {interval} hours, logging to {}. Press Ctrl+C to stop.",
    style(INFO_PREFIX).cyan(),
    style(log_dir(config).display()).yellow()
  );
  scheduler.run(pipeline).await;
  println!("{} Crawler stopped", style(SUCCESS_PREFIX).green());
  Ok(())
}
