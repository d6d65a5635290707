//! Relevance scoring and paper summaries from a language model.
//!
//! The three calls here never fail from the caller's point of view. Transport and service errors
//! are logged and turned into sentinel values: the methodology and contribution calls return
//! strings starting with `Error:` (see [`is_error_sentinel`]), and the relevance call returns a
//! not-relevant verdict with score `0.0`.
//!
//! The relevance answer is free text in a three-line grammar:
//!
//! ```text
//! SCORE: 0.85
//! EXPLANATION: strong quantum focus
//! TOPICS: qubit, entanglement
//! ```
//!
//! [`parse_relevance`] reads it and defaults every field it cannot make sense of.

use super::*;
use crate::{configuration::ServiceConfig, llm::ChatRequest};

/// Score at or above which a paper counts as relevant.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Methodology text stored for papers judged not relevant.
pub const NOT_RELEVANT: &str = "Not relevant to quantum computing";

/// Contributions text stored for papers judged not relevant.
pub const NOT_RELEVANT_CONTRIBUTIONS: &str = "N/A";

/// Prefix shared by every error sentinel.
pub const ERROR_PREFIX: &str = "Error:";

/// Returned by [`Summarize::key_contributions`] when the call fails.
pub const CONTRIBUTIONS_ERROR: &str = "Error: Unable to extract contributions";

/// Characters of paper text sent with a methodology request.
pub const METHODOLOGY_TEXT_CAP: usize = 15_000;

/// Characters of paper text sent with a contributions request.
pub const CONTRIBUTIONS_TEXT_CAP: usize = 10_000;

/// System prompt for methodology summaries.
const METHODOLOGY_SYSTEM_PROMPT: &str =
  "You are an expert research analyst specializing in quantum computing and quantum physics. You \
   extract detailed, technical methodology summaries from research papers.";

/// True for the strings the summarizer returns instead of content when a call fails.
pub fn is_error_sentinel(text: &str) -> bool { text.trim_start().starts_with(ERROR_PREFIX) }

/// Verdict of a relevance check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relevance {
  /// `score >= threshold`
  pub is_relevant:  bool,
  /// Model's score, `0.0` when unparseable
  pub score:        f64,
  /// Model's one-line reasoning, empty when absent
  pub explanation:  String,
  /// Topics the model listed; empty for `None`
  pub topics:       Vec<String>,
  /// The unparsed answer
  pub raw_response: String,
}

impl Relevance {
  /// The not-relevant verdict used when the check itself failed.
  pub fn failed(reason: impl Display) -> Self {
    Self {
      is_relevant:  false,
      score:        0.0,
      explanation:  format!("{ERROR_PREFIX} {reason}"),
      topics:       Vec::new(),
      raw_response: String::new(),
    }
  }
}

/// Parses a `SCORE:` / `EXPLANATION:` / `TOPICS:` answer.
///
/// Total: any input yields a value. Labels may be indented, scores may be wrapped in brackets,
/// and later lines with the same label win.
pub fn parse_relevance(text: &str, threshold: f64) -> Relevance {
  let mut score = 0.0;
  let mut explanation = String::new();
  let mut topics = Vec::new();

  for line in text.lines().map(str::trim) {
    if let Some(rest) = line.strip_prefix("SCORE:") {
      let raw = rest.trim().trim_start_matches('[').trim_end_matches(']').trim();
      score = match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value.clamp(0.0, 1.0),
        _ => {
          warn!("Unparseable relevance score `{raw}`, using 0.0");
          0.0
        },
      };
    } else if let Some(rest) = line.strip_prefix("EXPLANATION:") {
      explanation = rest.trim().to_string();
    } else if let Some(rest) = line.strip_prefix("TOPICS:") {
      let rest = rest.trim();
      topics = if rest.eq_ignore_ascii_case("none") || rest.is_empty() {
        Vec::new()
      } else {
        rest.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect()
      };
    }
  }

  Relevance {
    is_relevant: score >= threshold,
    score,
    explanation,
    topics,
    raw_response: text.trim().to_string(),
  }
}

/// Relevance checks and summaries.
#[async_trait]
pub trait Summarize: Send + Sync {
  /// Scores the paper's topical fit from its metadata.
  async fn relevance(&self, paper: &PaperRecord, threshold: f64) -> Relevance;

  /// Summarizes the methodology of the paper from its full text.
  async fn methodology(&self, text: &str, paper: &PaperRecord) -> String;

  /// Lists the key contributions of the paper from its full text.
  async fn key_contributions(&self, text: &str, paper: &PaperRecord) -> String;
}

/// [`Summarize`] backed by an OpenAI-compatible chat model.
#[derive(Debug, Clone)]
pub struct LlmSummarizer {
  /// Service endpoint
  base_url: String,
  /// Bearer token
  api_key:  String,
  /// Model name
  model:    String,
  /// Shared HTTP client
  client:   reqwest::Client,
}

impl LlmSummarizer {
  /// Creates a summarizer for the given service.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::Config`] when the base URL cannot be turned into an endpoint.
  pub fn new(service: &ServiceConfig) -> Result<Self> {
    crate::llm::completions_endpoint(&service.base_url)?;
    Ok(Self {
      base_url: service.base_url.clone(),
      api_key:  service.api_key.clone(),
      model:    service.model.clone(),
      client:   crate::llm::http_client(service.timeout()),
    })
  }

  /// A request with this summarizer's endpoint, credentials and model filled in.
  pub(crate) fn request(&self) -> ChatRequest {
    ChatRequest::new()
      .with_client(self.client.clone())
      .with_host(&self.base_url)
      .with_api_key(&self.api_key)
      .with_model(&self.model)
  }
}

/// Prompt asking for a relevance verdict in the three-line grammar.
fn relevance_prompt(paper: &PaperRecord) -> String {
  format!(
    "Analyze the following research paper metadata and determine its relevance to quantum \
     computing or quantum physics.

**Title:** {title}

**Abstract:**
{abstract_text}

**Categories:** {categories}

Provide:
1. A relevance score from 0.0 to 1.0 (where 1.0 is highly relevant to quantum computing/physics)
2. A brief explanation of why this score was assigned
3. Key quantum-related topics covered (if any)

Format your response as:
SCORE: [0.0-1.0]
EXPLANATION: [Your explanation]
TOPICS: [Comma-separated list of quantum topics, or \"None\"]
",
    title = paper.title,
    abstract_text = paper.abstract_text,
    categories = paper.categories.join(", "),
  )
}

/// Prompt asking for a structured methodology summary.
fn methodology_prompt(text: &str, paper: &PaperRecord) -> String {
  format!(
    "You are an expert in quantum computing and quantum physics research.
Your task is to analyze the following research paper and extract a detailed summary of its \
     methodology.

**Paper Title:** {title}

**Abstract:**
{abstract_text}

**Full Paper Text:**
{text}

---

Please provide a comprehensive summary of the paper's methodology in the following structure:

1. **Research Objective**: What problem is the paper trying to solve?

2. **Methodology Overview**: What approach does the paper take? (e.g., theoretical analysis, \
     experimental setup, algorithmic approach, simulation)

3. **Key Techniques**: What specific techniques, algorithms, or methods are used?
   - Mathematical frameworks
   - Quantum circuits or algorithms
   - Classical preprocessing/postprocessing
   - Optimization methods

4. **Implementation Details**:
   - Hardware/software platforms used
   - Quantum gate decompositions
   - Parameter settings
   - Computational resources

5. **Evaluation Approach**: How do they validate their results?
   - Benchmarks
   - Baselines
   - Metrics used
   - Experimental setup

6. **Key Results**: What are the main quantitative findings?

7. **Limitations**: What limitations do the authors acknowledge?

8. **Reproducibility**: Based on the paper, how reproducible is this work?
   - Are code/data available?
   - Are parameters clearly specified?
   - Are there ambiguities?

Please be specific and technical. Extract concrete details like parameter values, equations, \
     algorithm steps, etc.
",
    title = paper.title,
    abstract_text = paper.abstract_text,
    text = truncate_chars(text, METHODOLOGY_TEXT_CAP),
  )
}

/// Prompt asking for a short bullet list of contributions.
fn contributions_prompt(text: &str, paper: &PaperRecord) -> String {
  format!(
    "Based on the following quantum computing research paper, extract the 3-5 key contributions \
     in bullet points.

**Title:** {title}

**Abstract:**
{abstract_text}

**Paper Text:**
{text}

Provide a concise list of key contributions:",
    title = paper.title,
    abstract_text = paper.abstract_text,
    text = truncate_chars(text, CONTRIBUTIONS_TEXT_CAP),
  )
}

#[async_trait]
impl Summarize for LlmSummarizer {
  async fn relevance(&self, paper: &PaperRecord, threshold: f64) -> Relevance {
    let answer = self
      .request()
      .with_message(&relevance_prompt(paper))
      .with_max_tokens(256)
      .with_temperature(0.1)
      .send_for_text()
      .await;

    match answer {
      Ok(text) => {
        let relevance = parse_relevance(&text, threshold);
        debug!("{} scored {:.2}", paper.external_id, relevance.score);
        relevance
      },
      Err(e) => {
        error!("Relevance check for {} failed: {e}", paper.external_id);
        Relevance::failed(e)
      },
    }
  }

  async fn methodology(&self, text: &str, paper: &PaperRecord) -> String {
    let answer = self
      .request()
      .with_system(METHODOLOGY_SYSTEM_PROMPT)
      .with_message(&methodology_prompt(text, paper))
      .with_max_tokens(2048)
      .with_temperature(0.3)
      .send_for_text()
      .await;

    answer.unwrap_or_else(|e| {
      error!("Methodology summary for {} failed: {e}", paper.external_id);
      format!("{ERROR_PREFIX} Unable to generate summary - {e}")
    })
  }

  async fn key_contributions(&self, text: &str, paper: &PaperRecord) -> String {
    let answer = self
      .request()
      .with_message(&contributions_prompt(text, paper))
      .with_max_tokens(512)
      .with_temperature(0.2)
      .send_for_text()
      .await;

    answer.unwrap_or_else(|e| {
      error!("Contribution extraction for {} failed: {e}", paper.external_id);
      CONTRIBUTIONS_ERROR.to_string()
    })
  }
}
