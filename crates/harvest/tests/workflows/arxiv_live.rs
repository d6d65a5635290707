use super::*;

#[ignore = "Requires network access to export.arxiv.org"]
#[tokio::test]
async fn test_live_category_search() {
  let mut client = ArxivClient::new();
  let papers = client.search(&SearchParams::default().category("quant-ph").max_results(5)).await;
  assert!(!papers.is_empty());
  assert!(papers.windows(2).all(|w| w[0].published >= w[1].published));

  // Same query, same session: everything was already seen.
  let again = client.search(&SearchParams::default().category("quant-ph").max_results(5)).await;
  assert!(again.is_empty());
}

#[ignore = "Requires network access to export.arxiv.org"]
#[tokio::test]
async fn test_live_get_by_id() -> TestResult<()> {
  let paper = ArxivClient::new().get_by_id("2301.07041").await?.expect("paper exists");
  assert!(paper.title.contains("Verifiable Fully Homomorphic Encryption"));
  assert!(paper.external_id.starts_with("2301.07041"));
  Ok(())
}
