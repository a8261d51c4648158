//! Error types for the pharmalit library.
//!
//! One enum covers every failure mode of the pipeline. The variants fall in three groups:
//! - Recoverable per-item failures that the [`Fetcher`](crate::fetcher::Fetcher) absorbs and
//!   counts ([`PharmalitError::MalformedRecord`], [`PharmalitError::TransientService`])
//! - Fatal failures surfaced to the caller ([`PharmalitError::SearchFailed`],
//!   [`PharmalitError::InvalidQuery`], [`PharmalitError::AllBatchesFailed`])
//! - Wrapped errors from the underlying libraries
//!
//! # Examples
//!
//! ```no_run
//! use pharmalit::{error::PharmalitError, fetcher::Fetcher};
//!
//! # async fn example() -> Result<(), PharmalitError> {
//! let fetcher = Fetcher::from_config(Default::default())?;
//! match fetcher.search("cancer immunotherapy", 50).await {
//!   Err(PharmalitError::InvalidQuery(reason)) => println!("Bad query: {reason}"),
//!   Err(PharmalitError::SearchFailed(cause)) => println!("PubMed unavailable: {cause}"),
//!   Err(e) => println!("Other error: {e}"),
//!   Ok(search) => println!("{} identifiers found", search.identifier_count()),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Error type alias used for the [`pharmalit`](crate) crate.
pub type Result<T> = core::result::Result<T, PharmalitError>;

/// Errors that can occur when searching, parsing, classifying or exporting papers.
#[derive(Error, Debug)]
pub enum PharmalitError {
  /// One raw record could not be turned into a paper.
  ///
  /// Raised by the record parser when a required field (the identifier) is absent or the
  /// record is not well-formed XML. The orchestrator skips the record and counts it.
  #[error("Malformed record: {0}")]
  MalformedRecord(String),

  /// A remote call failed in a way that may succeed on a later attempt.
  ///
  /// This covers connection failures, timeouts, HTTP 429 and HTTP 5xx responses. Calls
  /// failing this way are retried with backoff before being given up on.
  #[error("Transient service error: {0}")]
  TransientService(String),

  /// The initial search call could not complete, even after retries.
  ///
  /// This is fatal for the invocation: without identifiers nothing else can be fetched.
  #[error("Search failed: {0}")]
  SearchFailed(String),

  /// The caller supplied an empty or malformed query.
  ///
  /// Detected before any remote call is made.
  #[error("Invalid query: {0}")]
  InvalidQuery(String),

  /// Every record batch of a search failed, so no paper could be produced.
  #[error("All {0} record batches failed")]
  AllBatchesFailed(usize),

  /// The remote API answered with an error that retrying will not fix.
  #[error("API error: {0}")]
  Api(String),

  /// A network request failed at the transport level.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// The XML reader rejected a document.
  #[error(transparent)]
  Xml(#[from] quick_xml::Error),

  /// A JSON payload could not be decoded.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// Writing CSV output failed.
  #[error(transparent)]
  Csv(#[from] csv::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Path(#[from] std::io::Error),

  /// A TOML configuration file could not be parsed.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// A configuration value is invalid.
  #[error("{0}")]
  Config(String),
}

impl PharmalitError {
  /// Whether retrying the failed operation could succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      PharmalitError::TransientService(_) => true,
      PharmalitError::Network(e) =>
        e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
      _ => false,
    }
  }
}
