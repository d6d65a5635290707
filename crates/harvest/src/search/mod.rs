//! arXiv search client with per-session deduplication and a topical pre-filter.
//!
//! [`ArxivClient`] talks to the arXiv Atom API and remembers every external id it has handed
//! out. A paper returned by one call is never returned again by the same client until
//! [`PaperSearch::reset`] is called, which keeps repeated crawls cheap on the store side.
//!
//! Every network or parse failure is absorbed here: [`PaperSearch::search`] logs the problem and
//! returns an empty list. Callers never see a search error.
//!
//! # Examples
//!
//! ```no_run
//! use harvest::{prelude::*, search::{ArxivClient, SearchParams}};
//!
//! # async fn example() {
//! let mut client = ArxivClient::new();
//! let params = SearchParams::default().category("quant-ph").keywords("error correction");
//! assert_eq!(params.query(), "cat:quant-ph AND all:error correction");
//!
//! for paper in client.search(&params).await {
//!   println!("{} {}", paper.external_id, paper.title);
//! }
//!
//! // Same query again: everything was already seen by this client
//! assert!(client.search(&params).await.is_empty());
//! # }
//! ```

use super::*;

pub mod feed;
pub mod filter;

pub use self::{feed::parse_feed, filter::*};

/// Default arXiv query endpoint.
pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

/// Time an arXiv request may take before the search counts as failed.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

lazy_static! {
  /// New-style identifiers such as `2403.00001` or `2403.00001v2`.
  static ref ARXIV_NEW: Regex = Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").unwrap();
  /// Old-style identifiers such as `math.AG/0601001`.
  static ref ARXIV_OLD: Regex = Regex::new(r"^[a-zA-Z.-]+/\d{7}(v\d+)?$").unwrap();
  /// Parsed form of [`ARXIV_API_URL`].
  static ref ARXIV_URL: Url = Url::parse(ARXIV_API_URL).unwrap();
}

/// Parameters for a single search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
  /// Free-text terms matched against all fields
  pub keywords:        Option<String>,
  /// arXiv category such as `quant-ph`
  pub category:        Option<String>,
  /// Page size requested from the API
  pub max_results:     usize,
  /// Drop results that fail [`is_domain_relevant`]
  pub filter_relevant: bool,
}

impl Default for SearchParams {
  fn default() -> Self {
    Self { keywords: None, category: None, max_results: 50, filter_relevant: true }
  }
}

impl SearchParams {
  /// Sets the keyword terms.
  pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
    self.keywords = Some(keywords.into());
    self
  }

  /// Sets the category.
  pub fn category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  /// Sets the page size.
  pub fn max_results(mut self, max_results: usize) -> Self {
    self.max_results = max_results;
    self
  }

  /// Enables or disables the topical pre-filter.
  pub fn filter_relevant(mut self, filter_relevant: bool) -> Self {
    self.filter_relevant = filter_relevant;
    self
  }

  /// Builds the arXiv `search_query` string.
  ///
  /// With neither keywords nor a category this falls back to [`DEFAULT_CATEGORY`].
  pub fn query(&self) -> String {
    let keywords = self.keywords.as_deref().map(str::trim).filter(|k| !k.is_empty());
    let category = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty());

    match (category, keywords) {
      (Some(cat), Some(all)) => format!("cat:{cat} AND all:{all}"),
      (Some(cat), None) => format!("cat:{cat}"),
      (None, Some(all)) => format!("all:{all}"),
      (None, None) => format!("cat:{DEFAULT_CATEGORY}"),
    }
  }
}

/// A source of paper metadata.
///
/// Implementations own their deduplication state, so a search takes `&mut self`.
#[async_trait]
pub trait PaperSearch: Send {
  /// Runs one search and returns records not seen before on this instance, newest first.
  ///
  /// Failures are logged and produce an empty list.
  async fn search(&mut self, params: &SearchParams) -> Vec<PaperRecord>;

  /// Forgets every id seen so far.
  fn reset(&mut self);
}

/// Client for the arXiv Atom API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
  /// Reused HTTP client
  client:   reqwest::Client,
  /// Query endpoint
  base_url: Url,
  /// External ids already returned by this instance
  seen:     HashSet<String>,
}

impl Default for ArxivClient {
  fn default() -> Self { Self::new() }
}

impl ArxivClient {
  /// Creates a client against the public arXiv endpoint.
  pub fn new() -> Self {
    Self {
      client:   crate::llm::http_client(SEARCH_TIMEOUT),
      base_url: ARXIV_URL.clone(),
      seen:     HashSet::new(),
    }
  }

  /// Points the client at a different endpoint, e.g. a mirror or a local test server.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::Config`] when `url` is not a valid absolute URL.
  pub fn with_base_url(mut self, url: &str) -> Result<Self> {
    self.base_url =
      Url::parse(url).map_err(|e| HarvestError::Config(format!("invalid arXiv URL `{url}`: {e}")))?;
    Ok(self)
  }

  /// Replaces the per-request time limit.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.client = crate::llm::http_client(timeout);
    self
  }

  /// Number of distinct ids returned so far.
  pub fn seen_count(&self) -> usize { self.seen.len() }

  /// Runs the same search over every entry of [`DOMAIN_CATEGORIES`] and concatenates the results.
  ///
  /// Papers cross-listed in several categories appear once, because the seen-set already holds
  /// them by the time the later category is searched.
  pub async fn search_categories(
    &mut self,
    keywords: Option<&str>,
    max_per_category: usize,
  ) -> Vec<PaperRecord> {
    let mut papers = Vec::new();
    for category in DOMAIN_CATEGORIES {
      let mut params = SearchParams::default().category(*category).max_results(max_per_category);
      params.keywords = keywords.map(str::to_string);
      papers.extend(self.search(&params).await);
    }
    papers
  }

  /// Fetches a single paper by arXiv id, bypassing the seen-set and the topical filter.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::ApiError`] for an id that is not shaped like an arXiv identifier,
  /// and network or feed errors as they occur.
  pub async fn get_by_id(&self, arxiv_id: &str) -> Result<Option<PaperRecord>> {
    let arxiv_id = arxiv_id.trim();
    if !ARXIV_NEW.is_match(arxiv_id) && !ARXIV_OLD.is_match(arxiv_id) {
      return Err(HarvestError::ApiError(format!("`{arxiv_id}` is not an arXiv identifier")));
    }

    let pairs = [("id_list", arxiv_id.to_string()), ("max_results", "1".to_string())];
    let mut papers = self.fetch(&pairs).await?;
    Ok(if papers.is_empty() { None } else { Some(papers.remove(0)) })
  }

  /// Applies session dedup and the optional topical filter, then sorts newest first.
  ///
  /// A record dropped by the filter is not marked as seen, so a later unfiltered search can
  /// still return it.
  pub fn accept(&mut self, papers: Vec<PaperRecord>, filter_relevant: bool) -> Vec<PaperRecord> {
    let total = papers.len();
    let mut accepted: Vec<PaperRecord> = papers
      .into_iter()
      .filter(|paper| {
        if self.seen.contains(&paper.external_id) {
          trace!("Already seen {}", paper.external_id);
          return false;
        }
        if filter_relevant && !is_domain_relevant(paper) {
          trace!("Filtered out off-topic {}", paper.external_id);
          return false;
        }
        self.seen.insert(paper.external_id.clone())
      })
      .collect();

    accepted.sort_by(|a, b| b.published.cmp(&a.published));
    debug!("Accepted {} of {total} search results", accepted.len());
    accepted
  }

  /// Sends one API request and parses the response.
  async fn fetch(&self, pairs: &[(&str, String)]) -> Result<Vec<PaperRecord>> {
    let response = self
      .client
      .get(self.base_url.clone())
      .query(pairs)
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;

    trace!("arXiv response: {response}");
    parse_feed(&response)
  }
}

#[async_trait]
impl PaperSearch for ArxivClient {
  async fn search(&mut self, params: &SearchParams) -> Vec<PaperRecord> {
    let query = params.query();
    debug!("Searching arXiv for `{query}`");

    let pairs = [
      ("search_query", query.clone()),
      ("start", "0".to_string()),
      ("max_results", params.max_results.to_string()),
      ("sortBy", "submittedDate".to_string()),
      ("sortOrder", "descending".to_string()),
    ];

    match self.fetch(&pairs).await {
      Ok(papers) => self.accept(papers, params.filter_relevant),
      Err(e) => {
        error!("arXiv search `{query}` failed: {e}");
        Vec::new()
      },
    }
  }

  fn reset(&mut self) {
    debug!("Clearing {} seen ids", self.seen.len());
    self.seen.clear();
  }
}
