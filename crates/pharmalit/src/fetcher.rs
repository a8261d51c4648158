//! The query orchestrator.
//!
//! A [`Fetcher`] turns a free-text query into classified papers:
//!
//! 1. the query is validated before anything is sent
//! 2. `esearch` returns identifiers in relevance order, at most `max_results` of them
//! 3. identifiers are fetched in batches, each request paced by the shared [`Throttle`] and
//!    retried on transient failures according to the [`RetryPolicy`]
//! 4. every record is parsed and every affiliation classified
//!
//! Failures are absorbed as locally as possible. A malformed record is skipped, a batch that
//! keeps failing is dropped, and both are counted in the [`SearchReport`]. Only a failed
//! identifier search, an invalid query, or a search where every batch failed is reported as
//! an error.
//!
//! Results are produced lazily by a [`Search`]: batch by batch with [`Search::next_batch`], as
//! a [`Stream`] with [`Search::into_stream`], or all at once with [`Search::collect`]. Nothing
//! is cached; running the same query again issues new requests.
//!
//! # Examples
//!
//! ```no_run
//! use pharmalit::{config::PharmalitConfig, fetcher::Fetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::from_config(PharmalitConfig::load_default()?)?.only_non_academic(true);
//!
//! let search = fetcher.search("\"adaptive design\" AND oncology", 50).await?;
//! let (papers, report) = search.collect().await?;
//! for paper in &papers {
//!   println!("{} {:?}", paper.paper.pmid, paper.company_affiliations);
//! }
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

use std::{
  collections::VecDeque,
  sync::atomic::{AtomicBool, Ordering},
};

use futures::{stream, Stream};

use super::*;
use crate::{
  client::EutilsClient,
  parser::{parse_record, split_records},
};

/// Runs searches against a [`LiteratureApi`].
///
/// Cloning is cheap; clones share the API client, throttle and classifier.
#[derive(Clone)]
pub struct Fetcher {
  /// Remote API
  api:               Arc<dyn LiteratureApi>,
  /// Pacing shared with every other user of the same API
  throttle:          Arc<Throttle>,
  /// Retry of transient failures
  retry:             RetryPolicy,
  /// Affiliation classifier
  classifier:        Arc<Classifier>,
  /// Identifiers per record request
  batch_size:        usize,
  /// Ceiling applied to requested result counts
  max_results_cap:   usize,
  /// Drop papers without non-academic authors
  only_non_academic: bool,
}

/// Counters describing how a search went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchReport {
  /// Result count asked for, after clamping
  pub requested:       usize,
  /// Identifiers returned by the search
  pub identifiers:     usize,
  /// Record batches the identifiers were split into
  pub batches:         usize,
  /// Papers handed to the caller
  pub yielded:         usize,
  /// Records dropped because they could not be parsed
  pub skipped_records: usize,
  /// Batches dropped because they could not be fetched or parsed
  pub failed_batches:  usize,
  /// Papers dropped by the non-academic filter
  pub filtered_out:    usize,
}

/// Stops a running [`Search`] before its next batch.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

/// An in-progress search: the identifiers still to fetch and the tallies so far.
pub struct Search {
  /// Remote API
  api:               Arc<dyn LiteratureApi>,
  /// Shared pacing
  throttle:          Arc<Throttle>,
  /// Retry of transient failures
  retry:             RetryPolicy,
  /// Affiliation classifier
  classifier:        Arc<Classifier>,
  /// Drop papers without non-academic authors
  only_non_academic: bool,
  /// Batches not fetched yet, in relevance order
  pending:           VecDeque<Vec<String>>,
  /// Running counters
  report:            SearchReport,
  /// Set to stop before the next batch
  cancel:            CancelHandle,
  /// No more batches will be produced
  finished:          bool,
}

impl Fetcher {
  /// Creates a fetcher with default settings around the given API and throttle.
  pub fn new(api: Arc<dyn LiteratureApi>, throttle: Arc<Throttle>) -> Self {
    let defaults = FetchConfig::default();
    Self {
      api,
      throttle,
      retry: RetryPolicy::default(),
      classifier: Arc::new(Classifier::default()),
      batch_size: defaults.batch_size,
      max_results_cap: defaults.max_results_cap,
      only_non_academic: defaults.only_non_academic,
    }
  }

  /// Creates an E-utilities backed fetcher with its own throttle.
  ///
  /// To share one throttle between several fetchers, pass it with [`Fetcher::with_throttle`].
  pub fn from_config(config: PharmalitConfig) -> Result<Self> {
    config.validate()?;
    let api = EutilsClient::new(&config.client)?;
    let throttle = Throttle::per_second(config.requests_per_second());
    debug!("requests spaced by {:?}", throttle.interval());

    Ok(Self {
      api:               Arc::new(api),
      throttle:          Arc::new(throttle),
      retry:             config.retry,
      classifier:        Arc::new(config.classifier()?),
      batch_size:        config.fetch.batch_size,
      max_results_cap:   config.fetch.max_results_cap,
      only_non_academic: config.fetch.only_non_academic,
    })
  }

  /// Uses a shared throttle.
  pub fn with_throttle(mut self, throttle: Arc<Throttle>) -> Self {
    self.throttle = throttle;
    self
  }

  /// Uses the given retry policy.
  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Uses the given classifier.
  pub fn with_classifier(mut self, classifier: Classifier) -> Self {
    self.classifier = Arc::new(classifier);
    self
  }

  /// Sets how many identifiers are fetched per request.
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  /// Sets the ceiling for requested result counts.
  pub fn with_max_results_cap(mut self, cap: usize) -> Self {
    self.max_results_cap = cap;
    self
  }

  /// Keeps only papers with at least one non-academic author.
  pub fn only_non_academic(mut self, only_non_academic: bool) -> Self {
    self.only_non_academic = only_non_academic;
    self
  }

  /// The throttle pacing this fetcher's requests.
  pub fn throttle(&self) -> &Arc<Throttle> { &self.throttle }

  /// Searches for `query` and prepares the retrieval of at most `max_results` papers.
  ///
  /// The identifier search runs now; records are fetched as the returned [`Search`] is
  /// consumed.
  ///
  /// # Errors
  ///
  /// - [`PharmalitError::InvalidQuery`] if the query is empty or unbalanced; nothing is sent
  /// - [`PharmalitError::SearchFailed`] if the identifier search fails after retries
  #[instrument(skip(self), level = "debug")]
  pub async fn search(&self, query: &str, max_results: usize) -> Result<Search> {
    validate_query(query)?;
    let query = query.trim();

    let requested = max_results.min(self.max_results_cap);
    if requested < max_results {
      info!("requested {max_results} results, limited to {requested}");
    }
    if requested == 0 {
      return Ok(self.start(requested, Vec::new()));
    }

    let api = &self.api;
    let throttle = &self.throttle;
    let ids = self
      .retry
      .retry("esearch", move || async move {
        throttle.acquire().await;
        api.search_ids(query, requested).await
      })
      .await
      .map_err(|e| PharmalitError::SearchFailed(e.to_string()))?;

    let mut seen = std::collections::HashSet::new();
    let mut ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
    ids.truncate(requested);
    info!("{} identifiers for {query:?}", ids.len());

    Ok(self.start(requested, ids))
  }

  /// Creates the search state for a list of identifiers.
  fn start(&self, requested: usize, ids: Vec<String>) -> Search {
    let pending: VecDeque<Vec<String>> =
      ids.chunks(self.batch_size).map(<[String]>::to_vec).collect();
    Search {
      api: Arc::clone(&self.api),
      throttle: Arc::clone(&self.throttle),
      retry: self.retry,
      classifier: Arc::clone(&self.classifier),
      only_non_academic: self.only_non_academic,
      report: SearchReport {
        requested,
        identifiers: ids.len(),
        batches: pending.len(),
        ..SearchReport::default()
      },
      pending,
      cancel: CancelHandle::default(),
      finished: false,
    }
  }
}

impl std::fmt::Debug for Fetcher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Fetcher")
      .field("throttle", &self.throttle)
      .field("retry", &self.retry)
      .field("batch_size", &self.batch_size)
      .field("max_results_cap", &self.max_results_cap)
      .field("only_non_academic", &self.only_non_academic)
      .finish_non_exhaustive()
  }
}

impl Search {
  /// Number of identifiers the search returned.
  pub fn identifier_count(&self) -> usize { self.report.identifiers }

  /// Counters so far.
  pub fn report(&self) -> &SearchReport { &self.report }

  /// A handle that stops this search before its next batch.
  pub fn cancel_handle(&self) -> CancelHandle { self.cancel.clone() }

  /// Fetches and classifies the next batch.
  ///
  /// Returns `None` once every batch has been processed or the search was cancelled. A batch
  /// that fails is counted and yields an empty list; when the last batch has been processed
  /// and every batch failed, [`PharmalitError::AllBatchesFailed`] is returned once.
  pub async fn next_batch(&mut self) -> Option<Result<Vec<ClassifiedPaper>>> {
    if self.finished {
      return None;
    }
    if self.cancel.is_cancelled() {
      debug!("search cancelled with {} batches left", self.pending.len());
      self.finished = true;
      return None;
    }

    let Some(batch) = self.pending.pop_front() else {
      self.finished = true;
      if self.report.batches > 0 && self.report.failed_batches == self.report.batches {
        return Some(Err(PharmalitError::AllBatchesFailed(self.report.batches)));
      }
      return None;
    };

    let papers = match self.fetch_batch(&batch).await {
      Some(papers) => papers,
      None => {
        self.report.failed_batches += 1;
        Vec::new()
      },
    };

    let before = papers.len();
    let papers: Vec<ClassifiedPaper> = papers
      .into_iter()
      .map(|paper| paper.classify(&self.classifier))
      .filter(|paper| !self.only_non_academic || paper.has_pharma_authors)
      .collect();
    self.report.filtered_out += before - papers.len();
    self.report.yielded += papers.len();
    Some(Ok(papers))
  }

  /// Fetches and parses one batch, or `None` if the batch has to be dropped.
  async fn fetch_batch(&mut self, batch: &[String]) -> Option<Vec<Paper>> {
    let api = &self.api;
    let throttle = &self.throttle;
    let fetched = self
      .retry
      .retry("efetch", move || async move {
        throttle.acquire().await;
        api.fetch_records(batch).await
      })
      .await;

    let document = match fetched {
      Ok(document) => document,
      Err(e) => {
        warn!("dropping batch of {} identifiers: {e}", batch.len());
        return None;
      },
    };
    let records = match split_records(&document) {
      Ok(records) => records,
      Err(e) => {
        warn!("dropping unreadable batch of {} identifiers: {e}", batch.len());
        return None;
      },
    };

    let mut papers = Vec::with_capacity(records.len());
    for record in &records {
      match parse_record(record) {
        Ok(paper) => papers.push(paper),
        Err(e) => {
          warn!("skipping record: {e}");
          self.report.skipped_records += 1;
        },
      }
    }
    if papers.is_empty() {
      warn!("no usable record among {} returned for {} identifiers", records.len(), batch.len());
      return None;
    }

    // Relevance order is the order of the identifiers, whatever order the records came in.
    let position: HashMap<&str, usize> =
      batch.iter().enumerate().map(|(index, id)| (id.as_str(), index)).collect();
    papers.sort_by_key(|paper| position.get(paper.pmid.as_str()).copied().unwrap_or(usize::MAX));
    Some(papers)
  }

  /// Consumes the search as a stream of papers in relevance order.
  ///
  /// Batches are fetched only as the stream is polled, so dropping the stream stops the
  /// search.
  pub fn into_stream(self) -> impl Stream<Item = Result<ClassifiedPaper>> + Send {
    stream::unfold((self, VecDeque::new()), |(mut search, mut ready)| async move {
      loop {
        if let Some(paper) = ready.pop_front() {
          return Some((Ok(paper), (search, ready)));
        }
        match search.next_batch().await {
          Some(Ok(papers)) => ready.extend(papers),
          Some(Err(e)) => return Some((Err(e), (search, ready))),
          None => return None,
        }
      }
    })
  }

  /// Runs the search to the end, returning every paper and the final report.
  ///
  /// # Errors
  ///
  /// Returns [`PharmalitError::AllBatchesFailed`] if no batch could be fetched.
  pub async fn collect(mut self) -> Result<(Vec<ClassifiedPaper>, SearchReport)> {
    let mut papers = Vec::new();
    while let Some(batch) = self.next_batch().await {
      papers.extend(batch?);
    }
    if self.report.skipped_records > 0 || self.report.failed_batches > 0 {
      warn!("partial results: {}", self.report);
    }
    Ok((papers, self.report))
  }
}

impl CancelHandle {
  /// Requests the search to stop before its next batch.
  pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }

  /// Whether cancellation was requested.
  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

impl SearchReport {
  /// Whether anything was lost on the way.
  pub fn is_partial(&self) -> bool { self.skipped_records > 0 || self.failed_batches > 0 }
}

impl Display for SearchReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} papers from {} identifiers ({} records skipped, {} of {} batches failed, {} filtered \
       out)",
      self.yielded,
      self.identifiers,
      self.skipped_records,
      self.failed_batches,
      self.batches,
      self.filtered_out
    )
  }
}

/// Rejects queries that cannot be sent: empty ones and ones with unbalanced quotes or
/// parentheses.
///
/// ```
/// use pharmalit::fetcher::validate_query;
///
/// assert!(validate_query("\"clinical trial\" AND (oncology OR cancer)").is_ok());
/// assert!(validate_query("   ").is_err());
/// assert!(validate_query("(oncology OR cancer").is_err());
/// ```
pub fn validate_query(query: &str) -> Result<()> {
  if query.trim().is_empty() {
    return Err(PharmalitError::InvalidQuery("query is empty".into()));
  }

  let mut in_quotes = false;
  let mut depth = 0usize;
  for c in query.chars() {
    match c {
      '"' => in_quotes = !in_quotes,
      '(' if !in_quotes => depth += 1,
      ')' if !in_quotes =>
        if depth == 0 {
          return Err(PharmalitError::InvalidQuery("unbalanced parentheses".into()));
        } else {
          depth -= 1;
        },
      _ => (),
    }
  }
  if in_quotes {
    return Err(PharmalitError::InvalidQuery("unbalanced quotes".into()));
  }
  if depth > 0 {
    return Err(PharmalitError::InvalidQuery("unbalanced parentheses".into()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashSet,
    sync::{atomic::AtomicUsize, Mutex},
  };

  use futures::StreamExt;

  use super::*;

  /// In-memory stand-in for the E-utilities service.
  #[derive(Default)]
  struct MockApi {
    /// Identifiers in relevance order with their record XML
    records:         Vec<(String, String)>,
    /// Transient failures of the search before it succeeds
    search_failures: AtomicUsize,
    /// The search always fails with a permanent error
    search_broken:   bool,
    /// Transient failures of record fetches before they succeed
    fetch_failures:  AtomicUsize,
    /// Batches containing one of these identifiers always fail
    unavailable:     HashSet<String>,
    /// Calls to `search_ids`
    search_calls:    AtomicUsize,
    /// Calls to `fetch_records`
    fetch_calls:     AtomicUsize,
    /// `max_results` of the last search
    last_max:        AtomicUsize,
    /// Identifier lists of successful fetches
    fetched:         Mutex<Vec<Vec<String>>>,
  }

  impl MockApi {
    fn with_records(records: Vec<(String, String)>) -> Self {
      Self { records, ..Default::default() }
    }
  }

  #[async_trait]
  impl LiteratureApi for MockApi {
    async fn search_ids(&self, _query: &str, max_results: usize) -> Result<Vec<String>> {
      self.search_calls.fetch_add(1, Ordering::SeqCst);
      self.last_max.store(max_results, Ordering::SeqCst);
      if self.search_broken {
        return Err(PharmalitError::Api("esearch returned 400 Bad Request".into()));
      }
      if self.search_failures.load(Ordering::SeqCst) > 0 {
        self.search_failures.fetch_sub(1, Ordering::SeqCst);
        return Err(PharmalitError::TransientService("esearch returned 503".into()));
      }
      Ok(self.records.iter().take(max_results).map(|(id, _)| id.clone()).collect())
    }

    async fn fetch_records(&self, ids: &[String]) -> Result<String> {
      self.fetch_calls.fetch_add(1, Ordering::SeqCst);
      if ids.iter().any(|id| self.unavailable.contains(id)) {
        return Err(PharmalitError::TransientService("efetch returned 502".into()));
      }
      if self.fetch_failures.load(Ordering::SeqCst) > 0 {
        self.fetch_failures.fetch_sub(1, Ordering::SeqCst);
        return Err(PharmalitError::TransientService("efetch returned 429".into()));
      }
      self.fetched.lock().unwrap().push(ids.to_vec());
      // records come back in reverse to check that relevance order is restored
      let body: String = ids
        .iter()
        .rev()
        .filter_map(|id| self.records.iter().find(|(known, _)| known == id))
        .map(|(_, xml)| xml.as_str())
        .collect();
      Ok(format!("<?xml version=\"1.0\"?><PubmedArticleSet>{body}</PubmedArticleSet>"))
    }
  }

  fn article(pmid: &str, title: &str, authors: &[(&str, &str)]) -> (String, String) {
    let authors: String = authors
      .iter()
      .map(|(name, affiliation)| {
        let (fore, last) = name.split_once(' ').unwrap_or(("", name));
        format!(
          "<Author><LastName>{last}</LastName><ForeName>{fore}</ForeName>\
           <AffiliationInfo><Affiliation>{affiliation}</Affiliation></AffiliationInfo></Author>"
        )
      })
      .collect();
    let xml = format!(
      "<PubmedArticle><MedlineCitation><PMID>{pmid}</PMID><Article>\
       <Journal><JournalIssue><PubDate><Year>2024</Year><Month>Jan</Month></PubDate>\
       </JournalIssue></Journal><ArticleTitle>{title}</ArticleTitle>\
       <AuthorList>{authors}</AuthorList></Article></MedlineCitation></PubmedArticle>"
    );
    (pmid.to_string(), xml)
  }

  fn malformed(id: &str) -> (String, String) {
    let xml = "<PubmedArticle><MedlineCitation><Article><ArticleTitle>No identifier\
               </ArticleTitle></Article></MedlineCitation></PubmedArticle>";
    (id.to_string(), xml.to_string())
  }

  fn academic_papers(count: usize) -> Vec<(String, String)> {
    (1..=count)
      .map(|n| {
        article(&n.to_string(), &format!("Paper {n}"), &[(
          "Ada Byron",
          "Department of Statistics, University of Oxford, UK",
        )])
      })
      .collect()
  }

  fn fetcher(api: &Arc<MockApi>) -> Fetcher {
    Fetcher::new(api.clone(), Arc::new(Throttle::unthrottled()))
      .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
  }

  fn pmids(papers: &[ClassifiedPaper]) -> Vec<&str> {
    papers.iter().map(|p| p.paper.pmid.as_str()).collect()
  }

  #[traced_test]
  #[tokio::test]
  async fn test_clinical_trial_scenario() {
    let api = Arc::new(MockApi::with_records(vec![
      article("39000001", "Bayesian adaptive platform trials", &[
        ("Scott Berry", "Berry Consultants, Austin, TX, USA"),
        ("Kert Viele", "Department of Biostatistics, University of Texas, Austin, TX"),
      ]),
      article("39000002", "Pragmatic trial design", &[(
        "Ann Smith",
        "Harvard Medical School, Boston, MA",
      )]),
      article("39000003", "Dose finding", &[("Li Wei", "Karolinska Institutet, Stockholm")]),
      article("39000004", "Never requested", &[]),
    ]));

    let search = fetcher(&api).search("clinical trial", 3).await.unwrap();
    assert_eq!(search.identifier_count(), 3);
    let (papers, report) = search.collect().await.unwrap();

    assert_eq!(pmids(&papers), vec!["39000001", "39000002", "39000003"]);
    let first = &papers[0];
    assert!(first.has_pharma_authors);
    assert_eq!(first.non_academic_authors, vec!["Scott Berry"]);
    assert_eq!(first.company_affiliations, vec!["Berry Consultants"]);
    assert_eq!(first.total_authors, 2);
    assert!(!papers[1].has_pharma_authors);
    assert!(papers[1].company_affiliations.is_empty());

    assert_eq!(report.requested, 3);
    assert_eq!(report.yielded, 3);
    assert!(!report.is_partial());
    assert_eq!(api.search_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 1);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_zero_results_makes_no_calls() {
    let api = Arc::new(MockApi::with_records(academic_papers(3)));
    let (papers, report) =
      fetcher(&api).search("clinical trial", 0).await.unwrap().collect().await.unwrap();
    assert!(papers.is_empty());
    assert_eq!(report, SearchReport::default());
    assert_eq!(api.search_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 0);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_invalid_queries_make_no_calls() {
    let api = Arc::new(MockApi::with_records(academic_papers(1)));
    for query in ["", "   \t", "\"clinical trial", "(cancer OR tumor", "cancer)"] {
      let result = fetcher(&api).search(query, 10).await;
      assert!(matches!(result, Err(PharmalitError::InvalidQuery(_))), "accepted {query:?}");
    }
    assert_eq!(api.search_calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_parentheses_inside_quotes_are_text() {
    assert!(validate_query("\"smile :)\" AND cancer").is_ok());
    assert!(validate_query("((a OR b) AND c)").is_ok());
  }

  #[traced_test]
  #[tokio::test]
  async fn test_no_identifiers() {
    let api = Arc::new(MockApi::default());
    let (papers, report) = fetcher(&api).search("nothing", 20).await.unwrap().collect().await.unwrap();
    assert!(papers.is_empty());
    assert_eq!(report.identifiers, 0);
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 0);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_requested_count_is_clamped() {
    let api = Arc::new(MockApi::with_records(academic_papers(5)));
    let search = fetcher(&api).with_max_results_cap(2).search("q", 5).await.unwrap();
    assert_eq!(api.last_max.load(Ordering::SeqCst), 2);
    assert_eq!(search.report().requested, 2);
    assert_eq!(search.identifier_count(), 2);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_relevance_order_across_batches() {
    let api = Arc::new(MockApi::with_records(academic_papers(5)));
    let (papers, report) =
      fetcher(&api).with_batch_size(2).search("q", 5).await.unwrap().collect().await.unwrap();
    assert_eq!(pmids(&papers), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(report.batches, 3);
    assert_eq!(*api.fetched.lock().unwrap(), vec![
      vec!["1".to_string(), "2".to_string()],
      vec!["3".to_string(), "4".to_string()],
      vec!["5".to_string()],
    ]);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_malformed_records_are_skipped() {
    let mut records = academic_papers(2);
    records.insert(1, malformed("99"));
    let api = Arc::new(MockApi::with_records(records));

    let (papers, report) = fetcher(&api).search("q", 3).await.unwrap().collect().await.unwrap();
    assert_eq!(pmids(&papers), vec!["1", "2"]);
    assert_eq!(report.skipped_records, 1);
    assert_eq!(report.failed_batches, 0);
    assert!(report.is_partial());
    assert!(logs_contain("skipping record"));
  }

  #[traced_test]
  #[tokio::test]
  async fn test_batch_of_only_malformed_records_fails() {
    let mut records = academic_papers(2);
    records.push(malformed("98"));
    records.push(malformed("99"));
    let api = Arc::new(MockApi::with_records(records));

    let (papers, report) =
      fetcher(&api).with_batch_size(2).search("q", 4).await.unwrap().collect().await.unwrap();
    assert_eq!(pmids(&papers), vec!["1", "2"]);
    assert_eq!(report.skipped_records, 2);
    assert_eq!(report.failed_batches, 1);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_transient_fetch_failures_are_retried() {
    let api = Arc::new(MockApi {
      fetch_failures: AtomicUsize::new(2),
      ..MockApi::with_records(academic_papers(2))
    });
    let (papers, report) = fetcher(&api).search("q", 2).await.unwrap().collect().await.unwrap();
    assert_eq!(papers.len(), 2);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 3);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_failing_batch_is_dropped() {
    let api = Arc::new(MockApi {
      unavailable: HashSet::from(["3".to_string()]),
      ..MockApi::with_records(academic_papers(5))
    });
    let (papers, report) =
      fetcher(&api).with_batch_size(2).search("q", 5).await.unwrap().collect().await.unwrap();
    assert_eq!(pmids(&papers), vec!["1", "2", "5"]);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.yielded, 3);
    // one attempt each for the good batches, three for the failing one
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 5);
    assert!(logs_contain("dropping batch"));
  }

  #[traced_test]
  #[tokio::test]
  async fn test_all_batches_failed() {
    let api = Arc::new(MockApi {
      unavailable: HashSet::from(["1".to_string(), "2".to_string()]),
      ..MockApi::with_records(academic_papers(2))
    });
    let search = fetcher(&api).with_batch_size(1).search("q", 2).await.unwrap();
    assert!(matches!(search.collect().await, Err(PharmalitError::AllBatchesFailed(2))));
  }

  #[traced_test]
  #[tokio::test]
  async fn test_all_batches_failed_ends_the_stream() {
    let api = Arc::new(MockApi {
      unavailable: HashSet::from(["1".to_string()]),
      ..MockApi::with_records(academic_papers(1))
    });
    let search = fetcher(&api).search("q", 1).await.unwrap();
    let items: Vec<_> = search.into_stream().collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(PharmalitError::AllBatchesFailed(1))));
  }

  #[traced_test]
  #[tokio::test]
  async fn test_search_retries_then_succeeds() {
    let api = Arc::new(MockApi {
      search_failures: AtomicUsize::new(1),
      ..MockApi::with_records(academic_papers(1))
    });
    let search = fetcher(&api).search("q", 1).await.unwrap();
    assert_eq!(search.identifier_count(), 1);
    assert_eq!(api.search_calls.load(Ordering::SeqCst), 2);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_search_failure_is_fatal() {
    let api = Arc::new(MockApi {
      search_failures: AtomicUsize::new(10),
      ..MockApi::with_records(academic_papers(1))
    });
    let result = fetcher(&api).search("q", 1).await;
    assert!(matches!(result, Err(PharmalitError::SearchFailed(_))));
    assert_eq!(api.search_calls.load(Ordering::SeqCst), 3);

    let api = Arc::new(MockApi { search_broken: true, ..MockApi::default() });
    let result = fetcher(&api).search("q", 1).await;
    assert!(matches!(result, Err(PharmalitError::SearchFailed(cause)) if cause.contains("400")));
    assert_eq!(api.search_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 0);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_only_non_academic_filter() {
    let mut records = academic_papers(2);
    records.insert(1, article("77", "Industry paper", &[("Jo Park", "Novartis AG, Basel")]));
    let api = Arc::new(MockApi::with_records(records));

    let (papers, report) = fetcher(&api)
      .only_non_academic(true)
      .search("q", 3)
      .await
      .unwrap()
      .collect()
      .await
      .unwrap();
    assert_eq!(pmids(&papers), vec!["77"]);
    assert_eq!(report.filtered_out, 2);
    assert_eq!(report.yielded, 1);
    assert_eq!(papers[0].company_affiliations, vec!["Novartis AG"]);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_cancel_between_batches() {
    let api = Arc::new(MockApi::with_records(academic_papers(4)));
    let mut search = fetcher(&api).with_batch_size(1).search("q", 4).await.unwrap();
    let cancel = search.cancel_handle();

    let first = search.next_batch().await.unwrap().unwrap();
    assert_eq!(pmids(&first), vec!["1"]);
    cancel.cancel();
    assert!(cancel.is_cancelled());
    assert!(search.next_batch().await.is_none());
    assert!(search.next_batch().await.is_none());
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 1);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_stream_is_lazy() {
    let api = Arc::new(MockApi::with_records(academic_papers(6)));
    let search = fetcher(&api).with_batch_size(2).search("q", 6).await.unwrap();
    let papers: Vec<_> = search.into_stream().take(3).collect().await;
    assert_eq!(papers.len(), 3);
    assert_eq!(papers[2].as_ref().unwrap().paper.pmid, "3");
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 2);
  }

  #[traced_test]
  #[tokio::test]
  async fn test_searches_share_the_throttle() {
    let api = Arc::new(MockApi::with_records(academic_papers(2)));
    let throttle = Arc::new(Throttle::new(Duration::from_millis(25)));
    let fetcher = fetcher(&api).with_batch_size(1).with_throttle(Arc::clone(&throttle));

    let start = tokio::time::Instant::now();
    let (one, two) = tokio::join!(
      async { fetcher.search("a", 2).await.unwrap().collect().await.unwrap() },
      async { fetcher.search("b", 2).await.unwrap().collect().await.unwrap() },
    );
    assert_eq!(one.0.len() + two.0.len(), 4);
    // two searches and four fetches, all through one throttle
    assert!(start.elapsed() >= Duration::from_millis(125));
    assert!(Arc::ptr_eq(fetcher.throttle(), &throttle));
  }

  #[test]
  fn test_report_display() {
    let report = SearchReport {
      requested:       10,
      identifiers:     8,
      batches:         2,
      yielded:         5,
      skipped_records: 1,
      failed_batches:  1,
      filtered_out:    2,
    };
    assert_eq!(
      report.to_string(),
      "5 papers from 8 identifiers (1 records skipped, 1 of 2 batches failed, 2 filtered out)"
    );
  }

  #[test]
  fn test_from_config() {
    let config = PharmalitConfig::default().with_api_key(Some("key".into()));
    let fetcher = Fetcher::from_config(config).unwrap();
    assert_eq!(fetcher.throttle().interval(), Duration::from_millis(100));
    tokio_test::assert_err!(Fetcher::from_config(PharmalitConfig {
      fetch: FetchConfig { batch_size: 0, ..Default::default() },
      ..Default::default()
    }));
  }
}
