//! Module for the research commands: questions, comparisons, trends, connections and free-form
//! tasks over the summarized papers in the store.

use harvest::{
  research::{save_report, ResearchEngine, ResearchOptions},
  summarize::LlmSummarizer,
};

use super::*;

/// Paper selection and generation flags shared by the research commands.
#[derive(Args, Clone)]
pub struct ResearchFlags {
  /// Only use papers whose title or abstract contains this text
  #[arg(long, short)]
  pub filter: Option<String>,

  /// Only use papers listed under this category
  #[arg(long, short)]
  pub category: Option<String>,

  /// Maximum papers given to the model
  #[arg(long)]
  pub max_papers: Option<usize>,

  /// Sampling temperature
  #[arg(long)]
  pub temperature: Option<f64>,

  /// Maximum tokens in the answer
  #[arg(long)]
  pub max_tokens: Option<u32>,

  /// Also save the report to this file
  #[arg(long, short)]
  pub output: Option<PathBuf>,
}

impl ResearchFlags {
  /// Applies the flags that were given on top of `defaults`.
  fn options(&self, defaults: ResearchOptions) -> Result<ResearchOptions> {
    let mut options = defaults;
    if let Some(filter) = &self.filter {
      options = options.filter(filter);
    }
    if let Some(category) = &self.category {
      options = options.category(category);
    }
    if let Some(max_papers) = self.max_papers {
      if max_papers == 0 {
        return Err(HarvestdError::InvalidArgument("--max-papers must be at least 1".into()));
      }
      options = options.max_papers(max_papers);
    }
    if let Some(temperature) = self.temperature {
      if !(0.0..=2.0).contains(&temperature) {
        return Err(HarvestdError::InvalidArgument("--temperature must be within 0..=2".into()));
      }
      options = options.temperature(temperature);
    }
    if let Some(max_tokens) = self.max_tokens {
      options = options.max_tokens(max_tokens);
    }
    Ok(options)
  }
}

/// Arguments for [`Commands::Research`]
#[derive(Args, Clone)]
pub struct ResearchArgs {
  /// The research question
  pub question: String,

  /// Follow-up iterations; above 1 the answers are chained and synthesized
  #[arg(long, short, default_value_t = 1)]
  pub depth: usize,

  /// Selection and generation flags
  #[command(flatten)]
  pub flags: ResearchFlags,
}

/// Arguments for [`Commands::Compare`]
#[derive(Args, Clone)]
pub struct CompareArgs {
  /// Topic to compare papers on; also selects papers unless `--filter` is given
  pub topic: String,

  /// Comma-separated aspects to compare along
  #[arg(long, short, value_delimiter = ',', required = true)]
  pub aspects: Vec<String>,

  /// Selection and generation flags
  #[command(flatten)]
  pub flags: ResearchFlags,
}

/// Arguments for [`Commands::Trends`]
#[derive(Args, Clone)]
pub struct TrendsArgs {
  /// Label for the period under analysis
  #[arg(long, default_value = "recent")]
  pub period: String,

  /// Focus area; also selects papers
  #[arg(long)]
  pub focus: Option<String>,

  /// Selection and generation flags
  #[command(flatten)]
  pub flags: ResearchFlags,
}

/// Arguments for [`Commands::Connections`]
#[derive(Args, Clone)]
pub struct ConnectionsArgs {
  /// arXiv id of a summarized paper, e.g. `2403.00001v1`
  pub arxiv_id: String,

  /// Selection and generation flags; `--max-papers` is the number of related papers
  #[command(flatten)]
  pub flags: ResearchFlags,
}

/// Arguments for [`Commands::Custom`]
#[derive(Args, Clone)]
pub struct CustomArgs {
  /// Instruction to run over the papers
  pub prompt: String,

  /// Selection and generation flags
  #[command(flatten)]
  pub flags: ResearchFlags,
}

/// Builds an engine on the summary service.
fn engine(config: &Config) -> Result<ResearchEngine> {
  let service = config.summary_service().ok_or_else(|| {
    HarvestdError::NotConfigured(
      "SUMMARY_API_KEY and SUMMARY_BASE_URL must be set to use research features".to_string(),
    )
  })?;
  Ok(ResearchEngine::new(LlmSummarizer::new(service)?, &service.model))
}

/// Prints a report and saves it when asked to.
fn present(report: &impl std::fmt::Display, output: Option<&Path>) -> Result<()> {
  println!("{report}");
  if let Some(path) = output {
    save_report(path, report)?;
    let saved_to = style(path.display()).yellow();
    println!("{} Report saved to {saved_to}", style(SUCCESS_PREFIX).green());
  }
  Ok(())
}

/// Function for the [`Commands::Research`] in the CLI.
pub async fn research(config: &Config, args: ResearchArgs) -> Result<()> {
  let ResearchArgs { question, depth, flags } = args;
  let recursive = depth > 1;
  let options = flags.options(if recursive {
    ResearchOptions::recursive()
  } else {
    ResearchOptions::question()
  })?;
  let engine = engine(config)?;
  let mut db = open_database(config).await?;

  let result = if recursive {
    println!("{} Researching over up to {depth} iterations", style(INFO_PREFIX).cyan());
    match engine.recursive(&mut db, &question, depth, &options).await {
      Ok(findings) => present(&findings, flags.output.as_deref()),
      Err(e) => Err(e.into()),
    }
  } else {
    println!("{} Researching: {question}", style(INFO_PREFIX).cyan());
    match engine.question(&mut db, &question, &options).await {
      Ok(findings) => present(&findings, flags.output.as_deref()),
      Err(e) => Err(e.into()),
    }
  };

  db.close().await?;
  result
}

/// Function for the [`Commands::Compare`] in the CLI.
pub async fn compare(config: &Config, args: CompareArgs) -> Result<()> {
  let CompareArgs { topic, aspects, flags } = args;
  let aspects: Vec<String> =
    aspects.into_iter().map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect();
  if aspects.is_empty() {
    return Err(HarvestdError::InvalidArgument("--aspects needs at least one aspect".into()));
  }
  let options = flags.options(ResearchOptions::comparison())?;
  let engine = engine(config)?;
  let mut db = open_database(config).await?;

  println!("{} Comparing papers on {topic}", style(INFO_PREFIX).cyan());
  let result = engine.compare(&mut db, &topic, &aspects, &options).await;
  db.close().await?;
  present(&result?, flags.output.as_deref())
}

/// Function for the [`Commands::Trends`] in the CLI.
pub async fn trends(config: &Config, args: TrendsArgs) -> Result<()> {
  let TrendsArgs { period, focus, flags } = args;
  let options = flags.options(ResearchOptions::trends())?;
  let engine = engine(config)?;
  let mut db = open_database(config).await?;

  println!("{} Analyzing {period} trends", style(INFO_PREFIX).cyan());
  let result = engine.trends(&mut db, &period, focus.as_deref(), &options).await;
  db.close().await?;
  present(&result?, flags.output.as_deref())
}

/// Function for the [`Commands::Connections`] in the CLI.
pub async fn connections(config: &Config, args: ConnectionsArgs) -> Result<()> {
  let ConnectionsArgs { arxiv_id, flags } = args;
  let options = flags.options(ResearchOptions::connections())?;
  let engine = engine(config)?;
  let mut db = open_database(config).await?;

  println!("{} Finding connections for {arxiv_id}", style(INFO_PREFIX).cyan());
  let result = engine.connections(&mut db, &arxiv_id, &options).await;
  db.close().await?;
  present(&result?, flags.output.as_deref())
}

/// Function for the [`Commands::Custom`] in the CLI.
pub async fn custom(config: &Config, args: CustomArgs) -> Result<()> {
  let CustomArgs { prompt, flags } = args;
  let options = flags.options(ResearchOptions::custom())?;
  let engine = engine(config)?;
  let mut db = open_database(config).await?;

  println!("{} Running custom research task", style(INFO_PREFIX).cyan());
  let result = engine.custom(&mut db, &prompt, &options).await;
  db.close().await?;
  present(&result?, flags.output.as_deref())
}
