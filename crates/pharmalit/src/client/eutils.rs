//! NCBI E-utilities: `esearch` for identifiers, `efetch` for records.

use reqwest::StatusCode;

use super::*;

/// `esearch.fcgi` JSON envelope.
#[derive(Debug, Deserialize)]
struct EsearchResponse {
  /// Result section; absent when the service reports a top-level error
  esearchresult: Option<EsearchResult>,
  /// Top-level error message
  error:         Option<String>,
}

/// The `esearchresult` object.
#[derive(Debug, Deserialize)]
struct EsearchResult {
  /// Matching identifiers in relevance order
  #[serde(default)]
  idlist: Vec<String>,
  /// Total number of matches, as a decimal string
  count:  Option<String>,
  /// Query error reported inside the result
  #[serde(rename = "ERROR")]
  error:  Option<String>,
}

/// [`LiteratureApi`] backed by the NCBI E-utilities HTTP service.
#[derive(Debug, Clone)]
pub struct EutilsClient {
  /// HTTP client carrying the request timeout
  http:     reqwest::Client,
  /// Base URL without trailing slash
  base_url: String,
  /// Entrez database name
  database: String,
  /// Parameters sent with every request (`tool`, `email`, `api_key`)
  common:   Vec<(&'static str, String)>,
}

impl EutilsClient {
  /// Creates a client from its configuration.
  ///
  /// # Errors
  ///
  /// Returns [`PharmalitError::Network`] if the HTTP client cannot be built.
  pub fn new(config: &ClientConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
      .build()?;

    let mut common = vec![("tool", config.tool.clone())];
    if let Some(email) = &config.email {
      common.push(("email", email.clone()));
    }
    if let Some(key) = &config.api_key {
      common.push(("api_key", key.clone()));
    }

    Ok(Self {
      http,
      base_url: config.base_url.trim_end_matches('/').to_string(),
      database: config.database.clone(),
      common,
    })
  }

  /// Whether requests carry an API key.
  pub fn has_api_key(&self) -> bool { self.common.iter().any(|(name, _)| *name == "api_key") }

  /// Sends a GET to `endpoint` and returns the body of a successful response.
  async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
    let url = format!("{}/{endpoint}", self.base_url);
    let response = self.http.get(&url).query(params).query(&self.common).send().await?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
      return Err(PharmalitError::TransientService(format!("{endpoint} returned {status}")));
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(PharmalitError::Api(format!(
        "{endpoint} returned {status}: {}",
        body.chars().take(200).collect::<String>()
      )));
    }
    Ok(response.text().await?)
  }
}

#[async_trait]
impl LiteratureApi for EutilsClient {
  #[instrument(skip(self), level = "debug")]
  async fn search_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
    let params = [
      ("db", self.database.clone()),
      ("term", query.to_string()),
      ("retmax", max_results.to_string()),
      ("retmode", "json".to_string()),
      ("sort", "relevance".to_string()),
    ];
    let body = self.get("esearch.fcgi", &params).await?;
    let response: EsearchResponse = serde_json::from_str(&body)?;

    if let Some(error) = response.error {
      return Err(PharmalitError::Api(format!("esearch: {error}")));
    }
    let result = response
      .esearchresult
      .ok_or_else(|| PharmalitError::Api("esearch response without esearchresult".into()))?;
    if let Some(error) = result.error {
      return Err(PharmalitError::Api(format!("esearch: {error}")));
    }

    let mut ids = result.idlist;
    ids.truncate(max_results);
    debug!(
      "esearch matched {} records, returning {}",
      result.count.as_deref().unwrap_or("?"),
      ids.len()
    );
    Ok(ids)
  }

  #[instrument(skip(self, ids), fields(count = ids.len()), level = "debug")]
  async fn fetch_records(&self, ids: &[String]) -> Result<String> {
    let params = [
      ("db", self.database.clone()),
      ("id", ids.join(",")),
      ("retmode", "xml".to_string()),
    ];
    let body = self.get("efetch.fcgi", &params).await?;
    trace!("efetch returned {} bytes", body.len());
    Ok(body)
  }
}
