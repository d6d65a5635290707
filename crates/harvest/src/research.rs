//! Research over the summarized papers in the store.
//!
//! Every task has the same shape. It gathers summarized, relevant papers from the store, lays
//! them out as context, and asks the summary model one thing about them. The tasks differ in the
//! papers they gather and the question they ask:
//!
//! - [`ResearchEngine::question`]: answer a research question with citations
//! - [`ResearchEngine::compare`]: compare papers on a topic along named aspects
//! - [`ResearchEngine::trends`]: read trends from papers ordered by publication date
//! - [`ResearchEngine::connections`]: relate one stored paper to the rest of the collection
//! - [`ResearchEngine::custom`]: run a free-form instruction over the papers
//!
//! [`ResearchEngine::recursive`] chains questions. After each answer the model is asked for one
//! follow-up question, which drives the next iteration, and all iterations are synthesized into
//! a final report.
//!
//! # Examples
//!
//! ```no_run
//! use harvest::{
//!   configuration::Config,
//!   database::Database,
//!   research::{ResearchEngine, ResearchOptions},
//!   summarize::LlmSummarizer,
//! };
//!
//! # async fn example() -> Result<(), harvest::error::HarvestError> {
//! let config = Config::load()?;
//! let mut db = Database::open(&config.database_path).await?;
//! let engine = ResearchEngine::new(LlmSummarizer::new(&config.summary)?, &config.summary.model);
//!
//! let options = ResearchOptions::question().category("quant-ph");
//! let findings =
//!   engine.question(&mut db, "Which decoders scale to large surface codes?", &options).await?;
//! println!("{findings}");
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;

use super::*;
use crate::{
  database::{Database, DatabaseInstruction, Query, SearchFilter},
  summarize::LlmSummarizer,
};

/// Characters of an answer shown to the model when asking for a follow-up question.
const FOLLOW_UP_CONTEXT_CAP: usize = 2_000;

/// Shortest answer accepted as a follow-up question.
const MIN_FOLLOW_UP_CHARS: usize = 10;

/// Papers considered when looking for connections to a source paper.
const CONNECTION_POOL: usize = 100;

/// Authors listed before "et al.".
const AUTHORS_SHOWN: usize = 3;

/// Rule drawn around reports.
const RULE: &str = "======================================================================";

/// Rule drawn between iterations of a recursive report.
const THIN_RULE: &str = "----------------------------------------------------------------------";

/// System prompt for research questions.
const QUESTION_SYSTEM: &str =
  "You are an expert quantum computing researcher with deep knowledge of quantum algorithms, \
   quantum hardware, quantum machine learning, and quantum information theory. You provide \
   comprehensive, well-cited research analysis.";

/// System prompt for comparisons.
const COMPARE_SYSTEM: &str =
  "You are an expert research analyst specializing in quantum computing. You excel at comparative \
   analysis and identifying patterns across research papers.";

/// System prompt for trend analysis.
const TRENDS_SYSTEM: &str =
  "You are an expert research analyst with deep knowledge of quantum computing trends, capable of \
   identifying patterns and predicting future directions.";

/// System prompt for paper connections.
const CONNECTIONS_SYSTEM: &str =
  "You are an expert at identifying connections between research papers, understanding how papers \
   build upon each other, and finding synergies across research.";

/// System prompt for free-form tasks.
const CUSTOM_SYSTEM: &str = "You are an expert quantum computing researcher capable of performing \
                             various research tasks and analysis on scientific papers.";

/// System prompt for follow-up questions.
const FOLLOW_UP_SYSTEM: &str =
  "You are a research strategist who identifies knowledge gaps and generates targeted follow-up \
   questions.";

/// System prompt for the final synthesis.
const SYNTHESIS_SYSTEM: &str =
  "You are an expert at synthesizing complex research findings into coherent narratives.";

/// One request to a research model.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
  /// Framing instructions
  pub system:      String,
  /// The task itself, including the paper context
  pub user:        String,
  /// Upper bound on the answer length
  pub max_tokens:  u32,
  /// Sampling temperature
  pub temperature: f64,
}

/// A model that answers research prompts.
#[async_trait]
pub trait ResearchModel: Send + Sync {
  /// Returns the model's answer to `prompt`.
  async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

#[async_trait]
impl ResearchModel for LlmSummarizer {
  async fn complete(&self, prompt: &Prompt) -> Result<String> {
    self
      .request()
      .with_system(&prompt.system)
      .with_message(&prompt.user)
      .with_max_tokens(prompt.max_tokens)
      .with_temperature(prompt.temperature)
      .send_for_text()
      .await
  }
}

/// Paper selection and generation settings for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchOptions {
  /// Substring matched against title or abstract
  pub filter:      Option<String>,
  /// Substring matched against the categories
  pub category:    Option<String>,
  /// Most papers given to the model
  pub max_papers:  usize,
  /// Sampling temperature
  pub temperature: f64,
  /// Upper bound on the answer length
  pub max_tokens:  u32,
}

impl ResearchOptions {
  /// Options without filters.
  fn with_limits(max_papers: usize, temperature: f64, max_tokens: u32) -> Self {
    Self { filter: None, category: None, max_papers, temperature, max_tokens }
  }

  /// Defaults for [`ResearchEngine::question`].
  pub fn question() -> Self { Self::with_limits(20, 0.4, 4096) }

  /// Defaults for [`ResearchEngine::compare`].
  pub fn comparison() -> Self { Self::with_limits(15, 0.3, 3072) }

  /// Defaults for [`ResearchEngine::trends`].
  pub fn trends() -> Self { Self::with_limits(30, 0.4, 3072) }

  /// Defaults for [`ResearchEngine::connections`]; `max_papers` is the number of related papers.
  pub fn connections() -> Self { Self::with_limits(10, 0.3, 2048) }

  /// Defaults for [`ResearchEngine::custom`].
  pub fn custom() -> Self { Self::with_limits(20, 0.5, 4096) }

  /// Defaults for each iteration of [`ResearchEngine::recursive`].
  pub fn recursive() -> Self { Self::with_limits(15, 0.4, 4096) }

  /// Only use papers whose title or abstract contains `filter`.
  pub fn filter(mut self, filter: impl Into<String>) -> Self {
    self.filter = Some(filter.into());
    self
  }

  /// Only use papers listed under `category`.
  pub fn category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  /// Sets the paper limit.
  pub fn max_papers(mut self, max_papers: usize) -> Self {
    self.max_papers = max_papers;
    self
  }

  /// Sets the temperature.
  pub fn temperature(mut self, temperature: f64) -> Self {
    self.temperature = temperature;
    self
  }

  /// Sets the answer length limit.
  pub fn max_tokens(mut self, max_tokens: u32) -> Self {
    self.max_tokens = max_tokens;
    self
  }
}

/// What a [`Findings`] report answers.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
  /// A research question
  Question(String),
  /// A comparison on a topic
  Comparison {
    /// Topic compared
    topic:   String,
    /// Aspects compared along
    aspects: Vec<String>,
  },
  /// A trend analysis
  Trends {
    /// Period label, e.g. `recent`
    period:   String,
    /// Optional focus area
    focus:    Option<String>,
    /// Oldest publication date among the papers
    earliest: Option<DateTime<Utc>>,
    /// Newest publication date among the papers
    latest:   Option<DateTime<Utc>>,
  },
  /// Connections of one paper to the collection
  Connections {
    /// External id of the source paper
    source_id:    String,
    /// Title of the source paper
    source_title: String,
  },
  /// A free-form instruction
  Custom(String),
}

/// Result of a single research task.
#[derive(Debug, Clone, PartialEq)]
pub struct Findings {
  /// The task that was run
  pub task:      Task,
  /// The model's answer
  pub answer:    String,
  /// External ids of the papers the model saw
  pub paper_ids: Vec<String>,
  /// Model name
  pub model:     String,
}

/// One step of a recursive investigation.
#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
  /// 1-based step number
  pub depth:     usize,
  /// Question asked at this step
  pub question:  String,
  /// The model's answer
  pub answer:    String,
  /// External ids of the papers the model saw
  pub paper_ids: Vec<String>,
}

/// Result of [`ResearchEngine::recursive`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveFindings {
  /// The question the investigation started from
  pub question:   String,
  /// Steps in order
  pub iterations: Vec<Iteration>,
  /// Final synthesis, or an `Error during synthesis` note
  pub synthesis:  String,
  /// Every paper seen in any step
  pub paper_ids:  BTreeSet<String>,
}

/// Runs research tasks against the store with a [`ResearchModel`].
#[derive(Debug, Clone)]
pub struct ResearchEngine<M = LlmSummarizer> {
  /// Model that answers prompts
  model:      M,
  /// Name reported in findings
  model_name: String,
}

/// Summarized, relevant papers matching the filters, newest first.
///
/// At most `limit` papers are read from the store before unsummarized and not-relevant ones are
/// dropped, so fewer may come back.
pub async fn gather_papers(
  db: &mut Database,
  filter: Option<&str>,
  category: Option<&str>,
  limit: usize,
) -> Result<Vec<PaperWithSummary>> {
  let mut search = SearchFilter::default().processed_only().limit(limit);
  if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
    search = search.text(filter.trim());
  }
  if let Some(category) = category.filter(|c| !c.trim().is_empty()) {
    search = search.category(category.trim());
  }

  let mut papers = Vec::new();
  for id in Query::search(search).execute(db).await?.into_iter().filter_map(|p| p.id) {
    match Query::with_summary(id).execute(db).await? {
      Some(entry) if entry.is_relevant_summary() => papers.push(entry),
      _ => trace!("Skipping paper {id} without a relevant summary"),
    }
  }
  debug!("Gathered {} papers for research", papers.len());
  Ok(papers)
}

/// Formats one paper as a context block.
pub fn format_paper(entry: &PaperWithSummary) -> String {
  let paper = &entry.paper;
  let mut authors =
    paper.authors.iter().take(AUTHORS_SHOWN).cloned().collect::<Vec<_>>().join(", ");
  if paper.authors.len() > AUTHORS_SHOWN {
    authors.push_str(" et al.");
  }
  let (methodology, contributions) = match &entry.summary {
    Some(s) => (s.methodology.as_str(), s.key_contributions.as_str()),
    None => ("Not available", "Not available"),
  };

  format!(
    "
---
**Paper ID:** {id}
**Title:** {title}
**Authors:** {authors}
**Published:** {published}
**Categories:** {categories}

**Abstract:**
{abstract_text}

**Methodology Summary:**
{methodology}

**Key Contributions:**
{contributions}
---
",
    id = paper.external_id,
    title = paper.title,
    published = paper.published.format("%Y-%m-%d"),
    categories = paper.categories.join(", "),
    abstract_text = paper.abstract_text,
  )
}

/// Context blocks for every paper, in order.
fn papers_context(papers: &[PaperWithSummary]) -> String {
  papers.iter().map(format_paper).collect::<Vec<_>>().join("\n")
}

/// Reads a follow-up answer. `None` when the model declined or the answer is too short.
pub fn parse_follow_up(answer: &str) -> Option<String> {
  let answer = answer.trim();
  if answer.eq_ignore_ascii_case("NONE") || answer.chars().count() < MIN_FOLLOW_UP_CHARS {
    return None;
  }
  Some(answer.to_string())
}

/// Fails with a readable message when nothing was gathered.
fn require_papers(papers: &[PaperWithSummary]) -> Result<()> {
  if papers.is_empty() {
    return Err(HarvestError::Research("No processed papers found matching criteria".to_string()));
  }
  Ok(())
}

impl<M: ResearchModel> ResearchEngine<M> {
  /// Engine that asks `model`, reporting it as `model_name`.
  pub fn new(model: M, model_name: &str) -> Self {
    Self { model, model_name: model_name.to_string() }
  }

  /// Sends one prompt with the generation settings of `options`.
  async fn ask(&self, system: &str, user: String, options: &ResearchOptions) -> Result<String> {
    let prompt = Prompt {
      system: system.to_string(),
      user,
      max_tokens: options.max_tokens,
      temperature: options.temperature,
    };
    self.model.complete(&prompt).await
  }

  /// Packs an answer into a report.
  fn findings(&self, task: Task, answer: String, papers: &[PaperWithSummary]) -> Findings {
    Findings {
      task,
      answer,
      paper_ids: papers.iter().map(|p| p.paper.external_id.clone()).collect(),
      model: self.model_name.clone(),
    }
  }

  /// Answers a research question from the papers selected by `options`.
  ///
  /// # Errors
  ///
  /// [`HarvestError::Research`] when no summarized paper matches, and store or model errors as
  /// they occur.
  pub async fn question(
    &self,
    db: &mut Database,
    question: &str,
    options: &ResearchOptions,
  ) -> Result<Findings> {
    let papers =
      gather_papers(db, options.filter.as_deref(), options.category.as_deref(), options.max_papers)
        .await?;
    require_papers(&papers)?;
    info!("Answering research question from {} papers", papers.len());

    let prompt = format!(
      "You are an expert quantum computing researcher conducting a comprehensive literature review.

You have access to {count} research papers on quantum computing and related topics.

**Research Question:**
{question}

**Available Papers:**
{context}

**Your Task:**
Based on the papers provided, please provide a comprehensive answer to the research question. Your \
       answer should:

1. **Direct Answer**: Provide a clear, direct answer to the research question
2. **Evidence from Literature**: Cite specific papers and their findings that support your answer
3. **Synthesis**: Synthesize insights across multiple papers
4. **Methodologies**: Discuss relevant methodologies used in the papers
5. **Key Findings**: Highlight key quantitative results and achievements
6. **Gaps & Opportunities**: Identify any gaps in the current research or future research \
       opportunities
7. **Contradictions**: Note any contradictions or debates in the literature
8. **Citations**: Reference papers by their ArXiv ID (e.g., [2511.10646v1])

Please be thorough, technical, and cite specific papers to support your claims.
",
      count = papers.len(),
      context = papers_context(&papers),
    );

    let answer = self.ask(QUESTION_SYSTEM, prompt, options).await?;
    Ok(self.findings(Task::Question(question.to_string()), answer, &papers))
  }

  /// Compares papers on `topic` along `aspects`.
  ///
  /// Without a filter in `options`, papers are selected by the topic itself.
  pub async fn compare(
    &self,
    db: &mut Database,
    topic: &str,
    aspects: &[String],
    options: &ResearchOptions,
  ) -> Result<Findings> {
    let filter = options.filter.as_deref().unwrap_or(topic);
    let papers =
      gather_papers(db, Some(filter), options.category.as_deref(), options.max_papers).await?;
    require_papers(&papers)?;
    info!("Comparing {} papers on {topic}", papers.len());

    let aspect_list = aspects.iter().map(|a| format!("- {a}")).collect::<Vec<_>>().join("\n");
    let prompt = format!(
      "You are conducting a comparative analysis of quantum computing research papers.

**Topic:** {topic}

**Aspects to Compare:**
{aspect_list}

**Papers for Analysis:**
{context}

**Your Task:**
Create a comprehensive comparative analysis table and discussion comparing these papers across \
       the specified aspects.

1. **Comparison Table**: Create a structured comparison showing how each paper approaches the topic
2. **Key Differences**: Highlight the main differences between approaches
3. **Key Similarities**: Identify common themes and techniques
4. **Performance Comparison**: If applicable, compare quantitative results
5. **Methodology Comparison**: Compare the methodologies used
6. **Strengths & Weaknesses**: Discuss the strengths and weaknesses of each approach
7. **Recommendations**: Which papers/approaches are most promising for different use cases?

Cite papers by ArXiv ID throughout your analysis.
",
      context = papers_context(&papers),
    );

    let answer = self.ask(COMPARE_SYSTEM, prompt, options).await?;
    let task = Task::Comparison { topic: topic.to_string(), aspects: aspects.to_vec() };
    Ok(self.findings(task, answer, &papers))
  }

  /// Reads research trends from papers ordered newest first.
  pub async fn trends(
    &self,
    db: &mut Database,
    period: &str,
    focus: Option<&str>,
    options: &ResearchOptions,
  ) -> Result<Findings> {
    let filter = focus.or(options.filter.as_deref());
    let mut papers =
      gather_papers(db, filter, options.category.as_deref(), options.max_papers).await?;
    require_papers(&papers)?;
    papers.sort_by(|a, b| b.paper.published.cmp(&a.paper.published));
    info!("Analyzing trends across {} papers", papers.len());

    let focus_line = focus.map(|f| format!("**Focus Area:** {f}")).unwrap_or_default();
    let prompt = format!(
      "You are analyzing research trends in quantum computing.

**Time Period:** {period}
{focus_line}

**Papers (sorted by publication date):**
{context}

**Your Task:**
Analyze the research trends across these papers and provide insights on:

1. **Emerging Topics**: What new topics or approaches are emerging?
2. **Evolving Methodologies**: How are methodologies evolving over time?
3. **Performance Improvements**: What quantitative improvements are being achieved?
4. **Popular Research Directions**: What areas are getting the most attention?
5. **Gaps & Opportunities**: What gaps exist in current research?
6. **Future Predictions**: Based on these trends, what do you predict for future research?
7. **Key Breakthroughs**: What are the most significant breakthroughs?
8. **Convergence**: Are there areas where different approaches are converging?

Provide specific examples and cite papers by ArXiv ID.
",
      context = papers_context(&papers),
    );

    let answer = self.ask(TRENDS_SYSTEM, prompt, options).await?;
    let task = Task::Trends {
      period:   period.to_string(),
      focus:    focus.map(str::to_string),
      earliest: papers.last().map(|p| p.paper.published),
      latest:   papers.first().map(|p| p.paper.published),
    };
    Ok(self.findings(task, answer, &papers))
  }

  /// Relates the stored paper `arxiv_id` to up to `options.max_papers` other summarized papers.
  ///
  /// # Errors
  ///
  /// [`HarvestError::Research`] when the paper is unknown, has no relevant summary yet, or has
  /// nothing to be compared with.
  pub async fn connections(
    &self,
    db: &mut Database,
    arxiv_id: &str,
    options: &ResearchOptions,
  ) -> Result<Findings> {
    let arxiv_id = arxiv_id.trim();
    let source_row = Query::by_external_id(arxiv_id)
      .execute(db)
      .await?
      .into_iter()
      .find_map(|p| p.id)
      .ok_or_else(|| HarvestError::Research(format!("Paper {arxiv_id} not found in database")))?;
    let source = Query::with_summary(source_row)
      .execute(db)
      .await?
      .filter(PaperWithSummary::is_relevant_summary)
      .ok_or_else(|| {
        HarvestError::Research(format!("Paper {arxiv_id} has not been summarized yet"))
      })?;

    let others: Vec<_> = gather_papers(db, None, None, CONNECTION_POOL)
      .await?
      .into_iter()
      .filter(|p| p.paper.external_id != arxiv_id)
      .take(options.max_papers)
      .collect();
    if others.is_empty() {
      return Err(HarvestError::Research("No other summarized papers to connect with".to_string()));
    }
    info!("Looking for connections between {arxiv_id} and {} papers", others.len());

    let prompt = format!(
      "You are analyzing connections between quantum computing research papers.

**Source Paper:**
{source_context}

**Other Papers in Collection:**
{others_context}

**Your Task:**
Identify and explain connections between the source paper and other papers. For each \
       connection, provide:

1. **Related Papers**: List papers that relate to the source paper
2. **Connection Type**:
   - Builds upon / extends
   - Uses similar methodology
   - Addresses related problem
   - Provides complementary approach
   - Contradicts or challenges
   - Cites or is cited by (if evident)
3. **Strength of Connection**: (Strong / Moderate / Weak)
4. **Explanation**: Explain the specific connection
5. **Potential Synergies**: How could combining insights from these papers be valuable?
6. **Research Gaps**: Are there gaps between these papers that represent opportunities?

Format as a structured analysis with clear connections.
",
      source_context = format_paper(&source),
      others_context = papers_context(&others),
    );

    let answer = self.ask(CONNECTIONS_SYSTEM, prompt, options).await?;
    let task = Task::Connections {
      source_id:    arxiv_id.to_string(),
      source_title: source.paper.title.clone(),
    };
    Ok(self.findings(task, answer, &others))
  }

  /// Runs a free-form instruction over the papers selected by `options`.
  pub async fn custom(
    &self,
    db: &mut Database,
    instruction: &str,
    options: &ResearchOptions,
  ) -> Result<Findings> {
    let papers =
      gather_papers(db, options.filter.as_deref(), options.category.as_deref(), options.max_papers)
        .await?;
    require_papers(&papers)?;
    info!("Running custom research task over {} papers", papers.len());

    let prompt = format!(
      "You are a quantum computing research expert.

**Available Research Papers:**
{context}

**Research Task:**
{instruction}

Please provide a comprehensive, well-researched response based on the papers provided. Cite \
       specific papers by ArXiv ID to support your analysis.
",
      context = papers_context(&papers),
    );

    let answer = self.ask(CUSTOM_SYSTEM, prompt, options).await?;
    Ok(self.findings(Task::Custom(instruction.to_string()), answer, &papers))
  }

  /// Investigates `question` for up to `max_depth` iterations, then synthesizes the answers.
  ///
  /// Each iteration after the first answers a follow-up question the model posed about the
  /// previous answer. The loop ends early when the model has no follow-up or an iteration fails.
  ///
  /// # Errors
  ///
  /// Only a failure of the first iteration is returned. A failed synthesis is reported inside
  /// [`RecursiveFindings::synthesis`].
  pub async fn recursive(
    &self,
    db: &mut Database,
    question: &str,
    max_depth: usize,
    options: &ResearchOptions,
  ) -> Result<RecursiveFindings> {
    let max_depth = max_depth.max(1);
    let mut iterations: Vec<Iteration> = Vec::new();
    let mut paper_ids = BTreeSet::new();
    let mut current = question.to_string();

    for depth in 1..=max_depth {
      info!("Research iteration {depth}/{max_depth}: {current}");
      let findings = match self.question(db, &current, options).await {
        Ok(findings) => findings,
        Err(e) if iterations.is_empty() => return Err(e),
        Err(e) => {
          warn!("Iteration {depth} failed, stopping: {e}");
          break;
        },
      };

      paper_ids.extend(findings.paper_ids.iter().cloned());
      iterations.push(Iteration {
        depth,
        question: current.clone(),
        answer: findings.answer,
        paper_ids: findings.paper_ids,
      });

      if depth == max_depth {
        break;
      }
      let Some(last) = iterations.last() else { break };
      match self.follow_up(question, &last.answer, depth).await {
        Some(next) => {
          debug!("Follow-up question: {next}");
          current = next;
        },
        None => {
          info!("No meaningful follow-up question, stopping after {depth} iterations");
          break;
        },
      }
    }

    let synthesis = self.synthesize(question, &iterations).await;
    Ok(RecursiveFindings { question: question.to_string(), iterations, synthesis, paper_ids })
  }

  /// Asks for one follow-up question. Any failure counts as having none.
  async fn follow_up(&self, question: &str, findings: &str, depth: usize) -> Option<String> {
    let prompt = format!(
      "Based on the research conducted so far, generate ONE specific follow-up question
that would deepen our understanding.

**Original Research Question:**
{question}

**Current Findings (Iteration {depth}):**
{findings}

**Your Task:**
Identify the most important gap, ambiguity, or area that needs deeper investigation.
Generate ONE specific, focused follow-up question that would:
1. Address a knowledge gap revealed by current findings
2. Drill deeper into a promising area
3. Clarify contradictions or ambiguities
4. Explore a specific methodology or approach in more detail

Return ONLY the follow-up question, nothing else. If no meaningful follow-up is needed, return \
       \"NONE\".
",
      findings = truncate_chars(findings, FOLLOW_UP_CONTEXT_CAP),
    );

    let options = ResearchOptions::with_limits(0, 0.6, 200);
    match self.ask(FOLLOW_UP_SYSTEM, prompt, &options).await {
      Ok(answer) => parse_follow_up(&answer),
      Err(e) => {
        warn!("Could not generate a follow-up question: {e}");
        None
      },
    }
  }

  /// Combines every iteration into one narrative.
  async fn synthesize(&self, question: &str, iterations: &[Iteration]) -> String {
    let all_findings = iterations
      .iter()
      .map(|it| format!("**Iteration {} - {}**\n{}", it.depth, it.question, it.answer))
      .collect::<Vec<_>>()
      .join("\n\n");

    let prompt = format!(
      "Synthesize the findings from a multi-iteration recursive research process.

**Original Research Question:**
{question}

**Findings from {count} Research Iterations:**
{all_findings}

**Your Task:**
Create a comprehensive synthesis that:
1. **Main Answer**: Provide a complete answer to the original question
2. **Key Insights**: Highlight the most important insights discovered
3. **Depth Progression**: Show how understanding deepened through iterations
4. **Comprehensive Evidence**: Cite papers across all iterations
5. **Contradictions Resolved**: Address any contradictions found
6. **Future Directions**: Suggest areas for continued research
7. **Executive Summary**: 2-3 paragraph summary of key findings

Make this a cohesive narrative, not just a list of iteration summaries.
",
      count = iterations.len(),
    );

    let options = ResearchOptions::with_limits(0, 0.4, 3072);
    match self.ask(SYNTHESIS_SYSTEM, prompt, &options).await {
      Ok(synthesis) => synthesis,
      Err(e) => {
        error!("Synthesis failed: {e}");
        format!("Error during synthesis: {e}\n\nThe individual iterations are listed above.")
      },
    }
  }
}

impl Display for Findings {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "{RULE}\nRESEARCH RESULTS\n{RULE}\n")?;
    writeln!(f, "Papers Analyzed: {}", self.paper_ids.len())?;
    writeln!(f, "Model Used: {}\n", self.model)?;

    match &self.task {
      Task::Question(question) => writeln!(f, "Research Question: {question}\n")?,
      Task::Comparison { topic, aspects } => {
        writeln!(f, "Topic: {topic}")?;
        writeln!(f, "Aspects: {}\n", aspects.join(", "))?;
      },
      Task::Trends { period, focus, earliest, latest } => {
        writeln!(f, "Time Period: {period}")?;
        if let Some(focus) = focus {
          writeln!(f, "Focus Area: {focus}")?;
        }
        if let (Some(earliest), Some(latest)) = (earliest, latest) {
          let (from, to) = (earliest.format("%Y-%m-%d"), latest.format("%Y-%m-%d"));
          writeln!(f, "Date Range: {from} to {to}")?;
        }
        writeln!(f)?;
      },
      Task::Connections { source_id, source_title } =>
        writeln!(f, "Source Paper: {source_id} ({source_title})\n")?,
      Task::Custom(instruction) => writeln!(f, "Task: {instruction}\n")?,
    }

    writeln!(f, "{}\n", self.answer)?;
    writeln!(f, "Papers: {}", self.paper_ids.join(", "))?;
    write!(f, "\n{RULE}")
  }
}

impl Display for RecursiveFindings {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "{RULE}\nRESEARCH RESULTS\n{RULE}\n")?;
    writeln!(f, "Research Type: Recursive Deep Research")?;
    writeln!(f, "Initial Question: {}", self.question)?;
    writeln!(f, "Total Iterations: {}", self.iterations.len())?;
    writeln!(f, "Total Papers Analyzed: {}\n", self.paper_ids.len())?;

    writeln!(f, "{RULE}\nITERATION DETAILS\n{RULE}\n")?;
    for iteration in &self.iterations {
      writeln!(f, "--- Iteration {} ---", iteration.depth)?;
      writeln!(f, "Question: {}", iteration.question)?;
      writeln!(f, "Papers: {}\n", iteration.paper_ids.len())?;
      writeln!(f, "{}\n", iteration.answer)?;
      writeln!(f, "{THIN_RULE}\n")?;
    }

    writeln!(f, "{RULE}\nCOMPREHENSIVE SYNTHESIS\n{RULE}\n")?;
    writeln!(f, "{}", self.synthesis)?;
    write!(f, "\n{RULE}")
  }
}

/// Writes a report to `path`, creating parent directories as needed.
pub fn save_report(path: impl AsRef<Path>, report: &impl Display) -> Result<()> {
  let path = path.as_ref();
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, format!("{report}\n"))?;
  info!("Research report saved to {}", path.display());
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::{collections::VecDeque, sync::Mutex};

  use super::*;
  use crate::{database::Add, summarize::NOT_RELEVANT};

  /// Answers prompts from a script and remembers what it was asked.
  #[derive(Default)]
  struct Scripted {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<Prompt>>,
  }

  impl Scripted {
    fn replying(replies: Vec<Result<String>>) -> Self {
      Self { replies: Mutex::new(replies.into()), prompts: Mutex::default() }
    }

    fn prompts(&self) -> Vec<Prompt> { self.prompts.lock().unwrap().clone() }
  }

  #[async_trait]
  impl ResearchModel for Scripted {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
      self.prompts.lock().unwrap().push(prompt.clone());
      self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Ok("answer".to_string()))
    }
  }

  fn engine(replies: Vec<Result<String>>) -> ResearchEngine<Scripted> {
    ResearchEngine::new(Scripted::replying(replies), "test/model")
  }

  fn reply(text: &str) -> Result<String> { Ok(text.to_string()) }

  /// Stores a paper and, unless `methodology` is `None`, a summary for it.
  async fn store(db: &mut Database, id: &str, title: &str, day: u32, methodology: Option<&str>) {
    let published = Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap();
    let paper = PaperRecord::new(id, title, &format!("Abstract about {title}."), published)
      .with_authors(["Ada", "Grace", "Alan", "Edsger"])
      .with_categories(["quant-ph"]);
    let row = Add::paper(&paper).execute(db).await.unwrap().id().unwrap();
    if let Some(methodology) = methodology {
      Add::summary(row, methodology, "- contribution").execute(db).await.unwrap();
    }
  }

  async fn collection() -> Database {
    let mut db = Database::open_in_memory().await.unwrap();
    store(&mut db, "2405.00001v1", "Surface code decoders", 1, Some("Union-find decoding")).await;
    store(&mut db, "2405.00002v1", "Qubit routing", 2, Some("Swap insertion")).await;
    store(&mut db, "2405.00003v1", "Protein folding", 3, Some(NOT_RELEVANT)).await;
    store(&mut db, "2405.00004v1", "Pending surface code paper", 4, None).await;
    db
  }

  #[tokio::test]
  async fn test_gather_keeps_only_relevant_summaries() {
    let mut db = collection().await;

    let all = gather_papers(&mut db, None, None, 50).await.unwrap();
    let ids: Vec<_> = all.iter().map(|p| p.paper.external_id.as_str()).collect();
    assert_eq!(ids, vec!["2405.00002v1", "2405.00001v1"]);

    let filtered = gather_papers(&mut db, Some("surface code"), None, 50).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].paper.external_id, "2405.00001v1");

    assert!(gather_papers(&mut db, None, Some("cs.LG"), 50).await.unwrap().is_empty());
  }

  #[test]
  fn test_format_paper_shortens_author_list() {
    let published = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let entry = PaperWithSummary {
      paper:   PaperRecord::new("2405.00009v1", "Title", "Abstract.", published)
        .with_authors(["A", "B", "C", "D"]),
      summary: None,
    };
    let block = format_paper(&entry);
    assert!(block.contains("**Authors:** A, B, C et al."));
    assert!(block.contains("**Published:** 2024-05-01"));
    assert!(block.contains("**Methodology Summary:**\nNot available"));
  }

  #[tokio::test]
  async fn test_question_sends_paper_context() {
    let mut db = collection().await;
    let engine = engine(vec![reply("Union-find wins [2405.00001v1]")]);

    let options = ResearchOptions::question();
    let findings = engine.question(&mut db, "Which decoder is fastest?", &options).await.unwrap();
    assert_eq!(findings.answer, "Union-find wins [2405.00001v1]");
    assert_eq!(findings.paper_ids, vec!["2405.00002v1", "2405.00001v1"]);
    assert_eq!(findings.model, "test/model");

    let prompts = engine.model.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].system, QUESTION_SYSTEM);
    assert_eq!(prompts[0].max_tokens, 4096);
    assert!(prompts[0].user.contains("**Research Question:**\nWhich decoder is fastest?"));
    assert!(prompts[0].user.contains("**Paper ID:** 2405.00001v1"));
    assert!(!prompts[0].user.contains("Protein folding"));

    let report = findings.to_string();
    assert!(report.contains("Research Question: Which decoder is fastest?"));
    assert!(report.contains("Papers Analyzed: 2"));
  }

  #[tokio::test]
  async fn test_no_matching_papers_is_a_research_error() {
    let mut db = collection().await;
    let engine = engine(vec![]);
    let options = ResearchOptions::question().filter("topological");

    let result = engine.question(&mut db, "Anything?", &options).await;
    assert!(
      matches!(result, Err(HarvestError::Research(msg)) if msg.contains("No processed papers"))
    );
    assert!(engine.model.prompts().is_empty());
  }

  #[tokio::test]
  async fn test_compare_and_trends() {
    let mut db = collection().await;
    let engine = engine(vec![reply("table"), reply("trends")]);

    let aspects = vec!["latency".to_string(), "accuracy".to_string()];
    let compared =
      engine.compare(&mut db, "lattice surgery", &aspects, &ResearchOptions::comparison()).await;
    // The topic doubles as the filter.
    assert!(matches!(compared, Err(HarvestError::Research(_))));

    let options = ResearchOptions::comparison().filter("Qubit");
    let compared = engine.compare(&mut db, "routing", &aspects, &options).await.unwrap();
    assert_eq!(compared.paper_ids, vec!["2405.00002v1"]);
    assert!(engine.model.prompts()[0].user.contains("- latency\n- accuracy"));

    let trends = engine.trends(&mut db, "recent", None, &ResearchOptions::trends()).await.unwrap();
    match &trends.task {
      Task::Trends { earliest, latest, .. } => {
        assert_eq!(earliest.unwrap().format("%d").to_string(), "01");
        assert_eq!(latest.unwrap().format("%d").to_string(), "02");
      },
      other => panic!("unexpected task {other:?}"),
    }
    assert!(trends.to_string().contains("Date Range: 2024-05-01 to 2024-05-02"));
  }

  #[tokio::test]
  async fn test_connections() {
    let mut db = collection().await;
    let engine = engine(vec![reply("related")]);
    let options = ResearchOptions::connections();

    let unknown = engine.connections(&mut db, "2405.99999v1", &options).await;
    assert!(matches!(unknown, Err(HarvestError::Research(msg)) if msg.contains("not found")));

    let pending = engine.connections(&mut db, "2405.00004v1", &options).await;
    assert!(
      matches!(pending, Err(HarvestError::Research(msg)) if msg.contains("not been summarized"))
    );

    let found = engine.connections(&mut db, "2405.00001v1", &options).await.unwrap();
    assert_eq!(found.paper_ids, vec!["2405.00002v1"]);
    assert_eq!(
      found.task,
      Task::Connections {
        source_id:    "2405.00001v1".into(),
        source_title: "Surface code decoders".into(),
      }
    );
    let prompt = &engine.model.prompts()[0].user;
    let source = prompt.find("**Source Paper:**").unwrap();
    let others = prompt.find("**Other Papers in Collection:**").unwrap();
    assert!(prompt[source..others].contains("2405.00001v1"));
    assert!(!prompt[others..].contains("2405.00001v1"));
  }

  #[test]
  fn test_parse_follow_up() {
    assert_eq!(parse_follow_up("none"), None);
    assert_eq!(parse_follow_up("  NONE \n"), None);
    assert_eq!(parse_follow_up("Why?"), None);
    assert_eq!(
      parse_follow_up(" How do decoders scale with distance? "),
      Some("How do decoders scale with distance?".to_string())
    );
  }

  #[traced_test]
  #[tokio::test]
  async fn test_recursive_follows_up_until_none() {
    let mut db = collection().await;
    let engine = engine(vec![
      reply("first answer"),
      reply("How does routing interact with decoding latency?"),
      reply("second answer"),
      reply("NONE"),
      reply("final synthesis"),
    ]);

    let options = ResearchOptions::recursive();
    let findings =
      engine.recursive(&mut db, "What limits fault tolerance?", 5, &options).await.unwrap();
    assert_eq!(findings.iterations.len(), 2);
    assert_eq!(findings.iterations[0].question, "What limits fault tolerance?");
    assert_eq!(findings.iterations[1].question, "How does routing interact with decoding latency?");
    assert_eq!(findings.iterations[1].answer, "second answer");
    assert_eq!(findings.synthesis, "final synthesis");
    assert_eq!(findings.paper_ids.len(), 2);

    let prompts = engine.model.prompts();
    assert_eq!(prompts.len(), 5);
    assert_eq!(prompts[1].system, FOLLOW_UP_SYSTEM);
    assert_eq!(prompts[1].max_tokens, 200);
    assert!(prompts[1].user.contains("**Current Findings (Iteration 1):**\nfirst answer"));
    assert_eq!(prompts[4].system, SYNTHESIS_SYSTEM);
    assert!(prompts[4].user.contains("**Iteration 2 - How does routing interact"));
    assert!(logs_contain("No meaningful follow-up question"));

    let report = findings.to_string();
    assert!(report.contains("Total Iterations: 2"));
    assert!(report.contains("--- Iteration 2 ---"));
    assert!(report.contains("COMPREHENSIVE SYNTHESIS\n"));
  }

  #[tokio::test]
  async fn test_recursive_stops_at_depth_and_survives_failed_synthesis() {
    let mut db = collection().await;
    let engine = engine(vec![
      reply("only answer"),
      Err(HarvestError::ApiError("overloaded".into())),
    ]);

    let findings =
      engine.recursive(&mut db, "Single pass?", 1, &ResearchOptions::recursive()).await.unwrap();
    assert_eq!(findings.iterations.len(), 1);
    assert!(findings.synthesis.starts_with("Error during synthesis: API error: overloaded"));
    assert_eq!(engine.model.prompts().len(), 2);
  }

  #[tokio::test]
  async fn test_recursive_first_iteration_failure_is_returned() {
    let mut db = Database::open_in_memory().await.unwrap();
    let engine = engine(vec![]);
    let result = engine.recursive(&mut db, "Anything?", 3, &ResearchOptions::recursive()).await;
    assert!(matches!(result, Err(HarvestError::Research(_))));
  }

  #[test]
  fn test_save_report() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reports").join("answer.txt");
    let findings = Findings {
      task:      Task::Custom("List open problems".into()),
      answer:    "Plenty.".into(),
      paper_ids: vec!["2405.00001v1".into()],
      model:     "m".into(),
    };

    save_report(&path, &findings).unwrap();
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("Task: List open problems"));
    assert!(saved.contains("Plenty."));
  }
}
