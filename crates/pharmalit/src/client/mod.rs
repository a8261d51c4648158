//! The remote literature API.
//!
//! [`LiteratureApi`] is the seam between the orchestrator and the network: one call turning a
//! query into ordered identifiers, one turning identifiers into a raw XML document. The
//! production implementation is [`EutilsClient`]; tests substitute their own.
//!
//! Implementations map failures onto the error taxonomy so the orchestrator can decide what
//! to retry:
//!
//! - [`PharmalitError::TransientService`] or a transport-level [`PharmalitError::Network`]
//!   error for conditions worth retrying (timeouts, HTTP 429, HTTP 5xx)
//! - [`PharmalitError::Api`] for everything retrying will not fix
//!
//! Implementations do not pace themselves; the orchestrator acquires the shared
//! [`Throttle`](crate::throttle::Throttle) before every call.

use super::*;

mod eutils;

pub use eutils::EutilsClient;

/// Search and retrieval operations against a bibliographic database.
#[async_trait]
pub trait LiteratureApi: Send + Sync {
  /// Identifiers matching `query`, most relevant first, at most `max_results` of them.
  async fn search_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>>;

  /// One XML document holding the records of `ids`.
  async fn fetch_records(&self, ids: &[String]) -> Result<String>;
}
