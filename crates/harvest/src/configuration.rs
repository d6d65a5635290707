//! Runtime configuration.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. An optional TOML file, by default `config.toml` under the platform config directory
//! 3. Environment variables, with a `.env` file in the working directory loaded first
//!
//! Missing service credentials are not an error here. [`Config::validate`] lists them, and the
//! clients that need them are simply not built, see [`Config::ocr_service`] and
//! [`Config::summary_service`].
//!
//! # Examples
//!
//! ```no_run
//! use harvest::configuration::Config;
//!
//! # fn example() -> Result<(), harvest::error::HarvestError> {
//! let config = Config::load()?;
//! for problem in config.validate() {
//!   eprintln!("warning: {problem}");
//! }
//! println!("{config}");
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use super::*;

/// Connection settings for one OpenAI-compatible service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  /// Bearer token
  pub api_key:      String,
  /// Base URL that `/chat/completions` is appended to
  pub base_url:     String,
  /// Model name sent with each request
  pub model:        String,
  /// Seconds a single request may take
  pub timeout_secs: u64,
}

impl ServiceConfig {
  /// Settings with an empty key and endpoint and the given model.
  fn with_model(model: &str) -> Self {
    Self {
      api_key:      String::new(),
      base_url:     String::new(),
      model:        model.to_string(),
      timeout_secs: crate::llm::DEFAULT_TIMEOUT_SECS,
    }
  }

  /// Per-request time limit. Zero falls back to the default.
  pub fn timeout(&self) -> Duration {
    match self.timeout_secs {
      0 => Duration::from_secs(crate::llm::DEFAULT_TIMEOUT_SECS),
      secs => Duration::from_secs(secs),
    }
  }

  /// True when both a key and an endpoint are present.
  pub fn is_configured(&self) -> bool {
    !self.api_key.trim().is_empty() && !self.base_url.trim().is_empty()
  }
}

impl Default for ServiceConfig {
  fn default() -> Self { Self::with_model("") }
}

/// Settings for the scheduled crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
  /// Hours between cycle starts
  pub interval_hours:        f64,
  /// Run a cycle as soon as the scheduler starts
  pub run_immediately:       bool,
  /// Categories searched every cycle
  pub categories:            Vec<String>,
  /// Keyword queries searched every cycle
  pub keywords:              Vec<String>,
  /// Page size for each of those searches
  pub max_results_per_query: usize,
  /// Unprocessed papers handled per cycle
  pub batch_size:            usize,
}

impl Default for CrawlConfig {
  fn default() -> Self {
    Self {
      interval_hours:        6.0,
      run_immediately:       true,
      categories:            vec!["quant-ph".into(), "cs.ET".into()],
      keywords:              vec![
        "quantum computing".into(),
        "quantum machine learning".into(),
        "variational quantum".into(),
        "quantum algorithm".into(),
        "quantum circuit".into(),
      ],
      max_results_per_query: 30,
      batch_size:            3,
    }
  }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// SQLite store location
  pub database_path:   PathBuf,
  /// Directory markdown exports are written to
  pub output_dir:      PathBuf,
  /// Pages OCR'd per paper
  pub max_pages:       u32,
  /// Render resolution for OCR
  pub ocr_dpi:         u32,
  /// Default page size for searches
  pub max_results:     usize,
  /// Apply the topical pre-filter to searches
  pub filter_relevant: bool,
  /// Vision model used for OCR
  pub ocr:             ServiceConfig,
  /// Language model used for relevance checks and summaries
  pub summary:         ServiceConfig,
  /// Scheduled crawler settings
  pub crawl:           CrawlConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_path:   crate::database::Database::default_path(),
      output_dir:      PathBuf::from("papers_output"),
      max_pages:       20,
      ocr_dpi:         200,
      max_results:     50,
      filter_relevant: true,
      ocr:             ServiceConfig::with_model("nanonets/nanonets-ocr2-3b"),
      summary:         ServiceConfig::with_model("openai/gpt-oss-20b"),
      crawl:           CrawlConfig::default(),
    }
  }
}

impl Config {
  /// Returns the default path for the configuration file.
  ///
  /// - On Unix: `~/.config/harvest/config.toml`
  /// - On macOS: `~/Library/Application Support/harvest/config.toml`
  /// - On Windows: `%APPDATA%\harvest\config.toml`
  /// - Fallback: `./harvest/config.toml`
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("harvest").join("config.toml")
  }

  /// Loads the configuration from [`Config::default_path`] and the environment.
  pub fn load() -> Result<Self> { Self::load_from(Self::default_path()) }

  /// Loads the configuration from `path`, if it exists, then applies environment overrides.
  ///
  /// # Errors
  ///
  /// Fails on unreadable or malformed TOML and on environment values that do not parse.
  pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
    match dotenvy::dotenv() {
      Ok(env_file) => debug!("Loaded environment from {}", env_file.display()),
      Err(e) if e.not_found() => trace!("No .env file found"),
      Err(e) => warn!("Ignoring unreadable .env file: {e}"),
    }

    let path = path.as_ref();
    let mut config = Self::read_file(path)?.unwrap_or_else(|| {
      trace!("No configuration file at {}, using defaults", path.display());
      Self::default()
    });

    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
  }

  /// Reads only the TOML file at `path`, without environment overrides.
  ///
  /// Returns `None` when there is no file.
  pub fn read_file(path: impl AsRef<Path>) -> Result<Option<Self>> {
    let path = path.as_ref();
    if !path.exists() {
      return Ok(None);
    }
    debug!("Reading configuration from {}", path.display());
    Ok(Some(toml::from_str(&std::fs::read_to_string(path)?)?))
  }

  /// Writes the configuration as TOML, creating parent directories as needed.
  ///
  /// On Unix the file is readable by its owner only.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(self)?)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
  }

  /// Copy of this configuration fit for writing back to the file `stored` was read from.
  ///
  /// API keys are taken from `stored`, or blanked when there is no file, so keys that only came
  /// from the environment never end up on disk.
  pub fn without_new_secrets(&self, stored: Option<&Self>) -> Self {
    let mut config = self.clone();
    config.ocr.api_key = stored.map(|s| s.ocr.api_key.clone()).unwrap_or_default();
    config.summary.api_key = stored.map(|s| s.summary.api_key.clone()).unwrap_or_default();
    config
  }

  /// Applies overrides from a variable lookup, normally the process environment.
  ///
  /// Empty values are treated as unset.
  pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
  where F: Fn(&str) -> Option<String> {
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(v) = get("OCR_API_KEY") {
      self.ocr.api_key = v;
    }
    if let Some(v) = get("OCR_BASE_URL") {
      self.ocr.base_url = v;
    }
    if let Some(v) = get("OCR_MODEL") {
      self.ocr.model = v;
    }
    if let Some(v) = get("SUMMARY_API_KEY") {
      self.summary.api_key = v;
    }
    if let Some(v) = get("SUMMARY_BASE_URL") {
      self.summary.base_url = v;
    }
    if let Some(v) = get("SUMMARY_MODEL") {
      self.summary.model = v;
    }
    if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
      let secs = parse_number("REQUEST_TIMEOUT_SECS", &v)?;
      self.ocr.timeout_secs = secs;
      self.summary.timeout_secs = secs;
    }
    if let Some(v) = get("DATABASE_PATH") {
      self.database_path = PathBuf::from(v);
    }
    if let Some(v) = get("MARKDOWN_OUTPUT_DIR") {
      self.output_dir = PathBuf::from(v);
    }
    if let Some(v) = get("DEFAULT_MAX_PAGES") {
      self.max_pages = parse_number("DEFAULT_MAX_PAGES", &v)?;
    }
    if let Some(v) = get("DEFAULT_OCR_DPI") {
      self.ocr_dpi = parse_number("DEFAULT_OCR_DPI", &v)?;
    }
    if let Some(v) = get("DEFAULT_MAX_RESULTS") {
      self.max_results = parse_number("DEFAULT_MAX_RESULTS", &v)?;
    }
    if let Some(v) = get("FILTER_QUANTUM_ONLY") {
      self.filter_relevant = v.trim().eq_ignore_ascii_case("true");
    }
    Ok(())
  }

  /// Lists missing settings. An empty list means every capability is available.
  pub fn validate(&self) -> Vec<String> {
    let mut problems = Vec::new();
    if self.ocr.api_key.trim().is_empty() {
      problems.push("OCR_API_KEY not set".to_string());
    }
    if self.summary.api_key.trim().is_empty() {
      problems.push("SUMMARY_API_KEY not set".to_string());
    }
    if self.ocr.base_url.trim().is_empty() {
      problems.push("OCR_BASE_URL not set".to_string());
    }
    if self.summary.base_url.trim().is_empty() {
      problems.push("SUMMARY_BASE_URL not set".to_string());
    }
    problems
  }

  /// OCR service settings, or `None` when OCR is unavailable.
  pub fn ocr_service(&self) -> Option<&ServiceConfig> { Some(&self.ocr).filter(|s| s.is_configured()) }

  /// Summary service settings, or `None` when summarization is unavailable.
  pub fn summary_service(&self) -> Option<&ServiceConfig> {
    Some(&self.summary).filter(|s| s.is_configured())
  }
}

/// Parses a numeric environment value.
fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
  T: FromStr,
  T::Err: Display, {
  value.trim().parse().map_err(|e| HarvestError::Config(format!("{key}=`{value}`: {e}")))
}

/// Masks a secret for display.
fn mask(secret: &str) -> &'static str { if secret.is_empty() { "NOT SET" } else { "**********" } }

impl Display for Config {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "OCR model:           {}", self.ocr.model)?;
    writeln!(f, "OCR base URL:        {}", self.ocr.base_url)?;
    writeln!(f, "OCR API key:         {}", mask(&self.ocr.api_key))?;
    writeln!(f)?;
    writeln!(f, "Summary model:       {}", self.summary.model)?;
    writeln!(f, "Summary base URL:    {}", self.summary.base_url)?;
    writeln!(f, "Summary API key:     {}", mask(&self.summary.api_key))?;
    writeln!(f)?;
    writeln!(f, "Database path:       {}", self.database_path.display())?;
    writeln!(f, "Markdown output dir: {}", self.output_dir.display())?;
    writeln!(f)?;
    writeln!(f, "Default max pages:   {}", self.max_pages)?;
    writeln!(f, "Default OCR DPI:     {}", self.ocr_dpi)?;
    writeln!(f, "Default max results: {}", self.max_results)?;
    writeln!(f, "Request timeout:     {}s", self.summary.timeout().as_secs())?;
    write!(f, "Filter relevant:     {}", self.filter_relevant)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> =
      vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
  }

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.ocr.model, "nanonets/nanonets-ocr2-3b");
    assert_eq!(config.summary.model, "openai/gpt-oss-20b");
    assert_eq!(config.max_pages, 20);
    assert_eq!(config.ocr_dpi, 200);
    assert_eq!(config.max_results, 50);
    assert!(config.filter_relevant);
    assert_eq!(config.crawl.batch_size, 3);
    assert!(config.ocr_service().is_none());
    assert_eq!(config.validate().len(), 4);
  }

  #[test]
  fn test_environment_overrides() {
    let mut config = Config::default();
    config
      .apply_overrides(lookup(&[
        ("OCR_API_KEY", "ocr-key"),
        ("OCR_BASE_URL", "http://localhost:8000/v1"),
        ("SUMMARY_MODEL", "local/model"),
        ("DATABASE_PATH", "/tmp/papers.db"),
        ("DEFAULT_MAX_PAGES", "5"),
        ("FILTER_QUANTUM_ONLY", "False"),
        ("SUMMARY_API_KEY", ""),
        ("REQUEST_TIMEOUT_SECS", "30"),
      ]))
      .unwrap();

    assert_eq!(config.ocr.timeout(), Duration::from_secs(30));
    assert_eq!(config.summary.timeout(), Duration::from_secs(30));

    assert!(config.ocr_service().is_some());
    assert!(config.summary_service().is_none());
    assert_eq!(config.summary.model, "local/model");
    assert_eq!(config.database_path, PathBuf::from("/tmp/papers.db"));
    assert_eq!(config.max_pages, 5);
    assert!(!config.filter_relevant);
    assert_eq!(config.validate(), vec!["SUMMARY_API_KEY not set", "SUMMARY_BASE_URL not set"]);
  }

  #[test]
  fn test_bad_number_is_a_config_error() {
    let mut config = Config::default();
    let result = config.apply_overrides(lookup(&[("DEFAULT_OCR_DPI", "high")]));
    assert!(matches!(result, Err(HarvestError::Config(msg)) if msg.contains("DEFAULT_OCR_DPI")));
  }

  #[test]
  fn test_save_and_reload_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.output_dir = dir.path().join("out");
    config.crawl.keywords = vec!["qubit".into()];
    config.save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let reloaded: Config = toml::from_str(&text).unwrap();
    assert_eq!(reloaded, config);
  }

  #[test]
  fn test_saving_keeps_environment_keys_out_of_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut effective = Config::default();
    effective.ocr.api_key = "from-env".into();
    effective.summary.api_key = "from-env-too".into();
    effective.summary.model = "local/model".into();

    effective.without_new_secrets(None).save(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("from-env"));
    assert!(text.contains("local/model"));

    let mut stored = Config::read_file(&path).unwrap().unwrap();
    stored.summary.api_key = "kept-in-file".into();
    let resaved = effective.without_new_secrets(Some(&stored));
    assert_eq!(resaved.summary.api_key, "kept-in-file");
    assert_eq!(resaved.ocr.api_key, "");

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let mode = std::fs::metadata(&path).unwrap().permissions().mode();
      assert_eq!(mode & 0o777, 0o600);
    }

    assert!(Config::read_file(dir.path().join("missing.toml")).unwrap().is_none());
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let config: Config = toml::from_str("max_pages = 3\n[crawl]\nbatch_size = 7\n").unwrap();
    assert_eq!(config.max_pages, 3);
    assert_eq!(config.crawl.batch_size, 7);
    assert_eq!(config.crawl.max_results_per_query, 30);
    assert_eq!(config.ocr_dpi, 200);
    assert_eq!(config.ocr.timeout_secs, 120);
  }

  #[test]
  fn test_display_masks_keys() {
    let mut config = Config::default();
    config.summary.api_key = "sk-secret".into();
    let shown = config.to_string();
    assert!(!shown.contains("sk-secret"));
    assert!(shown.contains("Summary API key:     **********"));
    assert!(shown.contains("OCR API key:         NOT SET"));
  }
}
