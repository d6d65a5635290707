//! Command line interface and crawler for the `harvest` paper pipeline.
//!
//! Every subcommand loads the same [`Config`]: the TOML file (if any), then environment variables,
//! then a `.env` file in the working directory. `--path` overrides the store location last.
//!
//! # Usage
//!
//! ```bash
//! # Search arXiv and store new papers
//! harvest search --keywords "quantum error correction" --max-results 20
//!
//! # Relevance check, OCR and summarize pending papers
//! harvest process --batch-size 5 --max-pages 15
//!
//! # Crawl every six hours until Ctrl+C
//! harvest crawl --interval 6
//!
//! # Inspect the store and the effective configuration
//! harvest stats --recent 10
//! harvest config
//!
//! # Markdown exports
//! harvest export --processed-only --summary
//! harvest ocr paper.pdf --output paper.md --max-pages 10
//!
//! # Research over summarized papers
//! harvest research "Which decoders scale best?" --category quant-ph --output answer.txt
//! harvest research "What limits fault tolerance?" --depth 3
//! harvest compare "error correction" --aspects "overhead,threshold"
//! harvest connections 2403.00001v1
//! ```
//!
//! Logging goes to stderr and is controlled with `-v` (repeatable) or `RUST_LOG`. The `crawl`
//! command additionally writes a daily rolling log file next to the database.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use harvest::{
  configuration::Config,
  database::{Database, Query, SearchFilter, SearchHistory, Statistics},
  error::HarvestError,
  export::MarkdownExporter,
  pipeline::Pipeline,
  prelude::*,
  record::truncate_chars,
};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

pub mod commands;
pub mod error;

use crate::{commands::*, error::*};

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for warning messages
static WARNING_PREFIX: &str = "⚠️ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";
/// Branch character for list items
static ITEM_PREFIX: &str = "├─";
/// Branch character for the last list item
static LAST_ITEM_PREFIX: &str = "└─";

/// File name prefix of the crawler's rolling log.
static CRAWL_LOG: &str = "crawler.log";

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Search, filter, OCR and summarize arXiv papers")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Path to the database file. Overrides `DATABASE_PATH` and the config file.
  #[arg(long, short, global = true)]
  path: Option<PathBuf>,

  /// Path to the config file. If not specified, uses the platform-specific config directory.
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,
}

impl Cli {
  /// Config file in effect for this invocation.
  fn config_path(&self) -> PathBuf { self.config.clone().unwrap_or_else(Config::default_path) }

  /// Loads the configuration and applies command line overrides.
  fn load_config(&self) -> Result<Config> {
    let mut config = Config::load_from(self.config_path())?;
    if let Some(path) = &self.path {
      config.database_path = path.clone();
    }
    Ok(config)
  }
}

/// Configures the logging system based on the verbosity level
///
/// The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
///
/// With `log_dir` set, everything at `info` and above is also appended to a daily rolling file in
/// that directory. The returned guard flushes the file writer when dropped.
fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
  let stderr = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_file(true)
    .with_line_number(true)
    .with_target(true)
    .with_filter(filter);

  let (file, guard) = match log_dir {
    Some(dir) => {
      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, CRAWL_LOG));
      let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(EnvFilter::new("info"));
      (Some(layer), Some(guard))
    },
    None => (None, None),
  };

  tracing_subscriber::registry().with(stderr).with(file).init();
  guard
}

/// Directory the crawler's log file goes to.
fn log_dir(config: &Config) -> PathBuf {
  config
    .database_path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .map_or_else(|| PathBuf::from("logs"), |p| p.join("logs"))
}

/// Entry point for the harvest CLI application
///
/// Parses arguments, loads configuration, sets up logging and runs the requested command. Any
/// error is printed once and turns into exit status 1.
#[tokio::main(flavor = "current_thread")]
async fn main() {
  let cli = Cli::parse();

  let config = match cli.load_config() {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{} {e}", style(ERROR_PREFIX).red());
      std::process::exit(1);
    },
  };

  let crawling = matches!(cli.command, Commands::Crawl(_));
  let (verbosity, log_dir) =
    if crawling { (cli.verbose.max(2), Some(log_dir(&config))) } else { (cli.verbose, None) };
  let guard = setup_logging(verbosity, log_dir.as_deref());
  debug!("Using config file {}", cli.config_path().display());

  let result = match cli.command.clone() {
    Commands::Search(args) => search(&config, args).await,
    Commands::Process(args) => process(&config, args).await,
    Commands::Crawl(args) => crawl(&config, args).await,
    Commands::Stats(args) => stats(&config, args).await,
    Commands::Config(args) => show_config(&config, &cli.config_path(), args),
    Commands::Export(args) => export(&config, args).await,
    Commands::Ocr(args) => ocr(&config, args).await,
    Commands::Research(args) => research(&config, args).await,
    Commands::Compare(args) => compare(&config, args).await,
    Commands::Trends(args) => trends(&config, args).await,
    Commands::Connections(args) => connections(&config, args).await,
    Commands::Custom(args) => custom(&config, args).await,
  };

  if let Err(e) = result {
    eprintln!("{} {e}", style(ERROR_PREFIX).red());
    drop(guard);
    std::process::exit(1);
  }
}
