use super::*;

#[traced_test]
#[tokio::test]
async fn test_ingest_then_reopen() -> TestResult<()> {
  let dir = tempdir()?;
  let (mut pipeline, searches) = fixture_pipeline(dir.path()).await;

  let report = pipeline.ingest(&quant_ph_plan()).await;
  assert_eq!(report.searches, 1);
  assert_eq!(report.inserted, 3);
  assert_eq!(searches.load(Ordering::SeqCst), 1);

  // The same session sees nothing new on the next search.
  let report = pipeline.ingest(&quant_ph_plan()).await;
  assert_eq!(report.found, 0);
  pipeline.close().await;

  // A new session sees everything again, and the store turns it all into duplicates.
  let (mut pipeline, _) = reopen(dir.path()).await;
  let report = pipeline.ingest(&quant_ph_plan()).await;
  assert_eq!(report.found, 3);
  assert_eq!(report.inserted, 0);
  assert_eq!(report.duplicates, 3);

  let stats = Statistics.execute(pipeline.database()).await?;
  assert_eq!(stats.total, 3);
  assert_eq!(stats.unprocessed, 3);
  assert_eq!(stats.by_category.get("quant-ph"), Some(&1));
  assert_eq!(stats.by_category.get("cond-mat.mes-hall"), Some(&1));
  assert_eq!(stats.by_category.get("cs.CR"), Some(&1));

  let found = Query::search(SearchFilter::default().text("lattice")).execute(pipeline.database()).await?;
  assert_eq!(found.len(), 2);
  Ok(())
}

/// Reopens the store written by [`fixture_pipeline`] with a fresh search session.
async fn reopen(dir: &Path) -> (Pipeline, Arc<AtomicUsize>) {
  let database = Database::open(dir.join("harvest.db")).await.unwrap();
  let (search, searches) = FixtureSearch::new();
  let pipeline = Pipeline::builder().with_database(database).with_search(search).build().unwrap();
  (pipeline, searches)
}

#[tokio::test]
async fn test_pipeline_requires_a_store() {
  let result = Pipeline::builder().with_search(FixtureSearch::new().0).build();
  assert!(matches!(result, Err(HarvestError::Config(_))));
}
