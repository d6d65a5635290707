use super::*;

mod arxiv_live;
mod crawl_cycle;
mod ingest;

#[traced_test]
#[test]
fn test_fixture_filtering() {
  let papers = parse_feed(&fixture_feed()).unwrap();
  assert_eq!(papers.len(), 4);

  let mut client = ArxivClient::new();
  let accepted = client.accept(papers.clone(), true);
  let ids: Vec<_> = accepted.iter().map(|p| p.external_id.as_str()).collect();
  // The cs.LG paper has neither a domain category nor a domain keyword.
  assert_eq!(ids, vec!["2405.01001v1", "2405.01002v2", "2405.01004v1"]);

  // Same session: nothing new, except the paper the filter rejected earlier.
  let again = client.accept(papers, false);
  assert_eq!(again.len(), 1);
  assert_eq!(again[0].external_id, "2405.01003v1");
  assert_eq!(client.seen_count(), 4);
}
