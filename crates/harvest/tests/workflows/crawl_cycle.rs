use harvest::scheduler::{Cycle, Scheduler};

use super::*;

#[traced_test]
#[tokio::test]
async fn test_process_and_export() -> TestResult<()> {
  let dir = tempdir()?;
  let (mut pipeline, _) = fixture_pipeline(dir.path()).await;
  pipeline.ingest(&quant_ph_plan()).await;

  let report = pipeline.process_batch(10, 5).await;
  assert_eq!(report.attempted, 3);
  // Only the lattice surgery paper mentions qubits in its title.
  assert_eq!(report.summarized, 1);
  assert_eq!(report.not_relevant, 2);
  assert_eq!(report.errors, 0);

  let stats = Statistics.execute(pipeline.database()).await?;
  assert_eq!(stats.unprocessed, 0);

  // Nothing left for a second batch.
  let report = pipeline.process_batch(10, 5).await;
  assert_eq!(report.attempted, 0);

  let out = dir.path().join("out");
  let index = std::fs::read_to_string(out.join(INDEX_FILE))?;
  assert!(index.contains("Lattice Surgery for Surface Code Qubits with Reduced Overhead"));
  assert!(!index.contains("Majorana"));
  assert!(out.join(COLLECTION_SUMMARY_FILE).exists());

  let paper_file = std::fs::read_dir(&out)?
    .filter_map(|entry| entry.ok())
    .find(|entry| entry.file_name().to_string_lossy().starts_with("2405.01001v1_"))
    .expect("exported paper file");
  let markdown = std::fs::read_to_string(paper_file.path())?;
  assert!(markdown.contains("Ada Lovelace"));
  assert!(markdown.contains("- A protocol"));
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_scheduler_runs_pipeline_until_shutdown() -> TestResult<()> {
  let dir = tempdir()?;
  let (pipeline, searches) = fixture_pipeline(dir.path()).await;

  let scheduler = Scheduler::new(std::time::Duration::from_millis(20))
    .with_poll_interval(std::time::Duration::from_millis(5));
  let shutdown = scheduler.shutdown_handle();

  let stopper = {
    let searches = searches.clone();
    async move {
      while searches.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
      }
      shutdown.request();
    }
  };

  tokio::join!(scheduler.run(pipeline), stopper);
  assert!(searches.load(Ordering::SeqCst) >= 2);

  let mut database = Database::open(dir.path().join("harvest.db")).await?;
  let stats = Statistics.execute(&mut database).await?;
  assert_eq!(stats.total, 3);
  assert_eq!(stats.processed, 3);
  Ok(())
}

#[tokio::test]
async fn test_single_cycle_with_default_plan() {
  let dir = tempdir().unwrap();
  let (mut pipeline, searches) = fixture_pipeline(dir.path()).await;

  // Two categories and five keyword searches; only the first one yields anything new.
  pipeline.run_cycle().await;
  assert_eq!(searches.load(Ordering::SeqCst), 7);

  let stats = pipeline.stats().clone();
  assert_eq!(stats.searches, 7);
  assert_eq!(stats.papers_found, 3);
  assert_eq!(stats.papers_processed, 1);
  assert_eq!(stats.errors, 0);
  pipeline.shutdown().await;
}
