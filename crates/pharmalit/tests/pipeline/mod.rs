use super::*;

#[traced_test]
#[tokio::test]
async fn test_pubmed_search_with_partial_failures() -> TestResult<()> {
  let server = MockServer::start_async().await;
  let search = server
    .mock_async(|when, then| {
      when.method(GET).path("/esearch.fcgi").query_param("term", "adaptive design");
      then.status(200).json_body(json!({"esearchresult": {"idlist": ["1", "2", "3"]}}));
    })
    .await;
  let first = pubmed_set(&[
    &citation("2", "Academic follow-up", &[("Ann Doe", "Harvard Medical School, Boston, MA")]),
    "<MedlineCitation><Article><ArticleTitle>No identifier</ArticleTitle></Article>\
     </MedlineCitation>",
    &citation("1", "Industry design", &[
      ("Scott Berry", "Berry Consultants, Austin, TX, USA"),
      ("Tom Lee", "Pfizer Inc., New York, NY. tom.lee@pfizer.com"),
    ]),
  ]);
  let first_batch = server
    .mock_async(|when, then| {
      when.method(GET).path("/efetch.fcgi").query_param("id", "1,2");
      then.status(200).body(first);
    })
    .await;
  let second_batch = server
    .mock_async(|when, then| {
      when.method(GET).path("/efetch.fcgi").query_param("id", "3");
      then.status(503);
    })
    .await;

  let fetcher = Fetcher::from_config(config_for(&server, "pubmed", 2))?;
  let (papers, report) = fetcher.search("adaptive design", 10).await?.collect().await?;

  search.assert_async().await;
  first_batch.assert_async().await;
  assert_eq!(second_batch.hits_async().await, 2);

  let ids: Vec<_> = papers.iter().map(|p| p.paper.pmid.as_str()).collect();
  assert_eq!(ids, vec!["1", "2"]);
  assert_eq!(papers[0].non_academic_authors, vec!["Scott Berry", "Tom Lee"]);
  assert_eq!(papers[0].company_affiliations, vec!["Berry Consultants", "Pfizer Inc."]);
  assert_eq!(papers[0].paper.corresponding_author_email.as_deref(), Some("tom.lee@pfizer.com"));
  assert!(!papers[1].has_pharma_authors);

  assert_eq!(report.identifiers, 3);
  assert_eq!(report.batches, 2);
  assert_eq!(report.failed_batches, 1);
  assert_eq!(report.skipped_records, 1);
  assert_eq!(report.yielded, 2);
  assert!(report.is_partial());
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_pmc_search_resolves_shared_affiliations() -> TestResult<()> {
  let server = MockServer::start_async().await;
  server
    .mock_async(|when, then| {
      when.method(GET).path("/esearch.fcgi").query_param("db", "pmc");
      then.status(200).json_body(json!({"esearchresult": {"idlist": ["9876543"]}}));
    })
    .await;
  let article = r#"<pmc-articleset><article><front><article-meta>
    <article-id pub-id-type="pmc">9876543</article-id>
    <article-id pub-id-type="pmid">35550001</article-id>
    <title-group><article-title>Dose selection</article-title></title-group>
    <contrib-group>
      <contrib contrib-type="author">
        <name><surname>Garcia</surname><given-names>Maria</given-names></name>
        <xref ref-type="aff" rid="aff1">1</xref>
      </contrib>
      <contrib contrib-type="author" corresp="yes">
        <name><surname>Chen</surname><given-names>Wei</given-names></name>
        <xref ref-type="aff" rid="aff2">2</xref>
        <email>wei.chen@stanford.edu</email>
      </contrib>
    </contrib-group>
    <aff id="aff1"><label>1</label>Novartis AG, Basel, Switzerland</aff>
    <aff id="aff2"><label>2</label>Stanford University School of Medicine, Stanford, CA</aff>
    <pub-date pub-type="epub"><month>05</month><year>2022</year></pub-date>
  </article-meta></front></article></pmc-articleset>"#;
  server
    .mock_async(|when, then| {
      when.method(GET).path("/efetch.fcgi").query_param("db", "pmc").query_param("id", "9876543");
      then.status(200).body(article);
    })
    .await;

  let fetcher = Fetcher::from_config(config_for(&server, "pmc", 200))?.only_non_academic(true);
  let (papers, report) = fetcher.search("dose selection", 5).await?.collect().await?;

  assert_eq!(papers.len(), 1);
  let paper = &papers[0];
  assert_eq!(paper.paper.pmid, "35550001");
  assert_eq!(paper.paper.publication_date.to_string(), "2022-05");
  assert_eq!(paper.non_academic_authors, vec!["Maria Garcia"]);
  assert_eq!(paper.company_affiliations, vec!["Novartis AG"]);
  assert_eq!(paper.paper.corresponding_author_email.as_deref(), Some("wei.chen@stanford.edu"));
  assert_eq!(paper.total_authors, 2);
  assert!(!report.is_partial());
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_every_batch_failing_is_an_error() -> TestResult<()> {
  let server = MockServer::start_async().await;
  server
    .mock_async(|when, then| {
      when.method(GET).path("/esearch.fcgi");
      then.status(200).json_body(json!({"esearchresult": {"idlist": ["7", "8"]}}));
    })
    .await;
  server
    .mock_async(|when, then| {
      when.method(GET).path("/efetch.fcgi");
      then.status(500);
    })
    .await;

  let fetcher = Fetcher::from_config(config_for(&server, "pubmed", 1))?;
  let result = fetcher.search("anything", 2).await?.collect().await;
  assert!(matches!(result, Err(PharmalitError::AllBatchesFailed(2))));
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_rejected_search_is_fatal() -> TestResult<()> {
  let server = MockServer::start_async().await;
  let esearch = server
    .mock_async(|when, then| {
      when.method(GET).path("/esearch.fcgi");
      then.status(200).json_body(json!({"error": "Invalid db name specified: nope"}));
    })
    .await;

  let fetcher = Fetcher::from_config(config_for(&server, "nope", 10))?;
  let result = fetcher.search("cancer", 10).await;
  assert!(matches!(result, Err(PharmalitError::SearchFailed(cause)) if cause.contains("nope")));
  // not transient, so not retried
  esearch.assert_hits_async(1).await;
  Ok(())
}

#[tokio::test]
async fn test_invalid_query_sends_nothing() -> TestResult<()> {
  let server = MockServer::start_async().await;
  let any = server
    .mock_async(|when, then| {
      when.any_request();
      then.status(200);
    })
    .await;

  let fetcher = Fetcher::from_config(config_for(&server, "pubmed", 10))?;
  assert!(matches!(fetcher.search("\"unterminated", 10).await, Err(PharmalitError::InvalidQuery(_))));
  assert!(matches!(fetcher.search("cancer", 0).await, Ok(search) if search.identifier_count() == 0));
  any.assert_hits_async(0).await;
  Ok(())
}
