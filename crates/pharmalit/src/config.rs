//! TOML configuration.
//!
//! Everything has a default, so a configuration file only names what it changes:
//!
//! ```toml
//! [client]
//! email = "me@example.org"
//!
//! [fetch]
//! batch_size          = 100
//! requests_per_second = 2.0
//!
//! [retry]
//! max_attempts = 5
//! ```
//!
//! The API key may come from the file (`client.api_key`) or from the `NCBI_API_KEY`
//! environment variable, which wins when set.

use super::*;

/// Environment variable holding an NCBI API key.
pub const API_KEY_ENV: &str = "NCBI_API_KEY";

/// Default E-utilities endpoint.
pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Upper bound for `retmax` accepted by esearch.
pub const ESEARCH_RETMAX_LIMIT: usize = 10_000;

/// Complete library configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PharmalitConfig {
  /// Remote API access
  pub client:          ClientConfig,
  /// Search orchestration
  pub fetch:           FetchConfig,
  /// Retry of transient failures
  pub retry:           RetryPolicy,
  /// Inline classifier tables; unspecified tables keep their defaults
  pub classifier:      ClassifierTables,
  /// Classifier tables file, replacing the inline tables when set
  pub classifier_file: Option<PathBuf>,
}

/// E-utilities client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  /// Base URL; `esearch.fcgi` and `efetch.fcgi` are resolved against it
  pub base_url:     String,
  /// Entrez database, `pubmed` or `pmc`
  pub database:     String,
  /// NCBI API key raising the request quota
  pub api_key:      Option<String>,
  /// `tool` parameter identifying this software to NCBI
  pub tool:         String,
  /// `email` parameter NCBI may use to contact the operator
  pub email:        Option<String>,
  /// Timeout for a single HTTP request, in seconds
  pub timeout_secs: u64,
}

/// Search orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
  /// Identifiers per efetch request
  pub batch_size:          usize,
  /// Ceiling applied to any requested result count
  pub max_results_cap:     usize,
  /// Overrides the request rate implied by the API key
  pub requests_per_second: Option<f64>,
  /// Keep only papers with at least one non-academic author
  pub only_non_academic:   bool,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url:     EUTILS_BASE_URL.to_string(),
      database:     "pubmed".to_string(),
      api_key:      None,
      tool:         env!("CARGO_PKG_NAME").to_string(),
      email:        None,
      timeout_secs: 30,
    }
  }
}

impl ClientConfig {
  /// The request timeout.
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      batch_size:          200,
      max_results_cap:     ESEARCH_RETMAX_LIMIT,
      requests_per_second: None,
      only_non_academic:   false,
    }
  }
}

impl PharmalitConfig {
  /// Parses a configuration from TOML text and validates it.
  pub fn from_toml_str(toml_str: &str) -> Result<Self> {
    let config: Self = toml::from_str(toml_str)?;
    config.validate()?;
    Ok(config)
  }

  /// Reads a configuration file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    debug!("loading configuration from {}", path.display());
    let mut config = Self::from_toml_str(&std::fs::read_to_string(path)?)?;
    // a relative tables file is relative to the configuration file
    if let (Some(file), Some(dir)) = (&config.classifier_file, path.parent()) {
      if file.is_relative() {
        config.classifier_file = Some(dir.join(file));
      }
    }
    Ok(config)
  }

  /// Location of the per-user configuration file.
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("pharmalit").join("config.toml")
  }

  /// Loads the per-user configuration if it exists, else the defaults, then applies the
  /// environment.
  pub fn load_default() -> Result<Self> {
    let path = Self::default_path();
    let config = if path.exists() { Self::from_file(&path)? } else { Self::default() };
    Ok(config.with_env())
  }

  /// Applies environment overrides.
  pub fn with_env(self) -> Self { self.with_api_key(std::env::var(API_KEY_ENV).ok()) }

  /// Replaces the API key when `key` is a non-empty value.
  pub fn with_api_key(mut self, key: Option<String>) -> Self {
    if let Some(key) = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
      self.client.api_key = Some(key);
    }
    self
  }

  /// Requests per second allowed against the remote API.
  pub fn requests_per_second(&self) -> f64 {
    self.fetch.requests_per_second.unwrap_or(if self.client.api_key.is_some() {
      throttle::API_KEY_RATE
    } else {
      throttle::UNAUTHENTICATED_RATE
    })
  }

  /// Builds the affiliation classifier this configuration describes.
  pub fn classifier(&self) -> Result<Classifier> {
    match &self.classifier_file {
      Some(path) => Classifier::from_file(path),
      None => Classifier::new(self.classifier.clone()),
    }
  }

  /// Checks values that would make searching impossible.
  pub fn validate(&self) -> Result<()> {
    if self.fetch.batch_size == 0 {
      return Err(PharmalitError::Config("fetch.batch_size must be at least 1".into()));
    }
    if self.fetch.max_results_cap == 0 {
      return Err(PharmalitError::Config("fetch.max_results_cap must be at least 1".into()));
    }
    if let Some(rate) = self.fetch.requests_per_second {
      if !(rate.is_finite() && rate > 0.0) {
        return Err(PharmalitError::Config(format!(
          "fetch.requests_per_second must be positive, got {rate}"
        )));
      }
    }
    if self.retry.max_attempts == 0 {
      return Err(PharmalitError::Config("retry.max_attempts must be at least 1".into()));
    }
    if self.client.timeout_secs == 0 {
      return Err(PharmalitError::Config("client.timeout_secs must be at least 1".into()));
    }
    Ok(())
  }
}
