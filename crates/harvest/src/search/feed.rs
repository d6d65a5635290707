//! Atom feed parsing for arXiv API responses.
//!
//! Parsing is deliberately lenient at the entry level. The feed as a whole must be well-formed
//! XML with a `<feed>` root, but each `<entry>` is cut out of the document and deserialized on its
//! own. An entry with a missing id, title or date, or with markup where text belongs, is logged
//! and skipped so the rest of the page survives.

use quick_xml::{de::from_str, events::Event, Reader};

use super::*;

lazy_static! {
  /// Runs of whitespace, including the hard line breaks arXiv wraps titles and abstracts with.
  static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// A feed entry with every field optional so a missing value is reported, not fatal.
#[derive(Debug, Deserialize)]
struct RawEntry {
  /// Abstract URL, e.g. `http://arxiv.org/abs/2403.00001v1`
  id:         Option<String>,
  /// Title, possibly line-wrapped
  title:      Option<String>,
  /// Abstract, possibly line-wrapped
  summary:    Option<String>,
  /// RFC 3339 first-publication timestamp
  published:  Option<String>,
  /// RFC 3339 last-update timestamp
  updated:    Option<String>,
  /// Authors in feed order
  #[serde(rename = "author", default)]
  authors:    Vec<RawAuthor>,
  /// Category tags, primary first
  #[serde(rename = "category", default)]
  categories: Vec<RawCategory>,
}

/// `<author><name>…</name></author>`
#[derive(Debug, Deserialize)]
struct RawAuthor {
  /// Author's full name
  name: Option<String>,
}

/// `<category term="…"/>`
#[derive(Debug, Deserialize)]
struct RawCategory {
  /// Category tag such as `quant-ph`
  #[serde(rename = "@term")]
  term: Option<String>,
}

impl RawEntry {
  /// Validates the entry and converts it into a [`PaperRecord`].
  fn into_record(self) -> core::result::Result<PaperRecord, String> {
    let url = self.id.ok_or("missing <id>")?;
    if url.contains("/api/errors") {
      return Err(format!("API error entry: {}", self.summary.unwrap_or_default().trim()));
    }
    let external_id = url.rsplit("/abs/").next().unwrap_or(&url).trim().to_string();
    if external_id.is_empty() {
      return Err(format!("empty id in {url}"));
    }

    let title = collapse_whitespace(&self.title.ok_or("missing <title>")?);
    let abstract_text = collapse_whitespace(&self.summary.unwrap_or_default());
    let published = parse_timestamp(self.published.as_deref().ok_or("missing <published>")?)?;
    let updated = match self.updated.as_deref() {
      Some(raw) => parse_timestamp(raw)?,
      None => published,
    };

    let authors = self.authors.into_iter().filter_map(|a| a.name).map(|n| collapse_whitespace(&n));
    let categories = self.categories.into_iter().filter_map(|c| c.term);

    Ok(
      PaperRecord::new(&external_id, &title, &abstract_text, published)
        .with_updated(updated)
        .with_authors(authors)
        .with_categories(categories),
    )
  }
}

/// Replaces line breaks and runs of whitespace with a single space.
fn collapse_whitespace(text: &str) -> String { WHITESPACE.replace_all(text.trim(), " ").into_owned() }

/// Parses an RFC 3339 timestamp into UTC.
fn parse_timestamp(raw: &str) -> core::result::Result<DateTime<Utc>, String> {
  DateTime::parse_from_rfc3339(raw.trim())
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| format!("bad timestamp `{raw}`: {e}"))
}

/// Parses an arXiv Atom response into paper records.
///
/// Malformed entries are skipped with a warning. Only a document that is not a feed at all is an
/// error.
///
/// # Errors
///
/// Returns [`HarvestError::Feed`] when the XML is not well-formed or its root is not `<feed>`.
pub fn parse_feed(xml: &str) -> Result<Vec<PaperRecord>> {
  let entries = entry_slices(xml)?;

  let mut papers = Vec::with_capacity(entries.len());
  for (idx, entry) in entries.into_iter().enumerate() {
    let record =
      from_str::<RawEntry>(entry).map_err(|e| e.to_string()).and_then(RawEntry::into_record);
    match record {
      Ok(paper) => papers.push(paper),
      Err(reason) => warn!("Skipping malformed feed entry #{idx}: {reason}"),
    }
  }
  Ok(papers)
}

/// Cuts the raw XML of every top-level `<entry>` out of a feed document.
fn entry_slices(xml: &str) -> Result<Vec<&str>> {
  let feed_error = |e: quick_xml::Error| HarvestError::Feed(e.to_string());
  let not_a_feed = |name: &[u8]| {
    HarvestError::Feed(format!("expected <feed>, found <{}>", String::from_utf8_lossy(name)))
  };

  let mut reader = Reader::from_str(xml);
  let mut entries = Vec::new();
  let mut depth = 0usize;
  let mut has_root = false;

  loop {
    let start = reader.buffer_position() as usize;
    match reader.read_event().map_err(feed_error)? {
      Event::Start(e) if depth == 0 => {
        if has_root || e.local_name().as_ref() != b"feed" {
          return Err(not_a_feed(e.local_name().as_ref()));
        }
        has_root = true;
        depth = 1;
      },
      Event::Empty(e) if depth == 0 => {
        if has_root || e.local_name().as_ref() != b"feed" {
          return Err(not_a_feed(e.local_name().as_ref()));
        }
        has_root = true;
      },
      Event::Start(e) if depth == 1 && e.local_name().as_ref() == b"entry" => {
        reader.read_to_end(e.name()).map_err(feed_error)?;
        entries.push(&xml[start..reader.buffer_position() as usize]);
      },
      Event::Empty(e) if depth == 1 && e.local_name().as_ref() == b"entry" => {
        entries.push(&xml[start..reader.buffer_position() as usize]);
      },
      Event::Start(_) => depth += 1,
      Event::End(_) => depth = depth.saturating_sub(1),
      Event::Eof => break,
      _ => {},
    }
  }

  if !has_root {
    return Err(HarvestError::Feed("document has no <feed> element".to_string()));
  }
  Ok(entries)
}

#[cfg(test)]
mod tests {
  use super::*;

  const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=cat:quant-ph</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2024-03-02T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2403.00001v1</id>
    <updated>2024-03-02T10:00:00Z</updated>
    <published>2024-03-01T09:30:00Z</published>
    <title>Routing Qubits
      on Sparse Hardware</title>
    <summary>  We route qubits
  across a sparse coupling map.
</summary>
    <author><name>Alice Example</name></author>
    <author><name>Bob Example</name><affiliation>Somewhere</affiliation></author>
    <link href="http://arxiv.org/abs/2403.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2403.00001v1" rel="related" type="application/pdf"/>
    <category term="quant-ph" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.ET" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2403.00002v1</id>
    <title>No dates here</title>
    <summary>Broken entry.</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2402.09999v3</id>
    <published>2024-02-20T08:00:00Z</published>
    <title>Entanglement witnesses</title>
    <summary>Short.</summary>
    <category term="quant-ph"/>
  </entry>
</feed>"#;

  #[traced_test]
  #[test]
  fn test_parse_feed_skips_malformed_entries() {
    let papers = parse_feed(FEED).unwrap();
    assert_eq!(papers.len(), 2);
    assert!(logs_contain("Skipping malformed feed entry #1"));

    let first = &papers[0];
    assert_eq!(first.external_id, "2403.00001v1");
    assert_eq!(first.title, "Routing Qubits on Sparse Hardware");
    assert_eq!(first.abstract_text, "We route qubits across a sparse coupling map.");
    assert_eq!(first.authors, vec!["Alice Example", "Bob Example"]);
    assert_eq!(first.categories, vec!["quant-ph", "cs.ET"]);
    assert_eq!(first.published, Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap());
    assert_eq!(first.updated, Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap());
    assert_eq!(first.pdf_link, "https://arxiv.org/pdf/2403.00001v1.pdf");

    let second = &papers[1];
    assert_eq!(second.external_id, "2402.09999v3");
    assert_eq!(second.updated, second.published);
    assert!(second.authors.is_empty());
  }

  #[traced_test]
  #[test]
  fn test_markup_inside_an_entry_only_skips_that_entry() {
    let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/2403.00010v1</id>
    <published>2024-03-05T00:00:00Z</published>
    <title>Bad <b>markup</b></title>
    <summary>Nested element where text belongs.</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2403.00011v1</id>
    <published>2024-03-05T00:00:00Z</published>
    <title>First title</title>
    <title>Second title</title>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2403.00012v1</id>
    <published>2024-03-06T00:00:00Z</published>
    <title>Clean entry</title>
    <summary>Fine.</summary>
  </entry>
  <entry/>
</feed>"#;

    let papers = parse_feed(xml).unwrap();
    assert_eq!(papers.len(), 1);
    assert_eq!(papers[0].external_id, "2403.00012v1");
    assert!(logs_contain("Skipping malformed feed entry #0"));
    assert!(logs_contain("Skipping malformed feed entry #1"));
    assert!(logs_contain("Skipping malformed feed entry #3"));
  }

  #[test]
  fn test_parse_empty_feed() {
    let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#;
    assert!(parse_feed(xml).unwrap().is_empty());
  }

  #[test]
  fn test_parse_garbage_is_an_error() {
    assert!(matches!(parse_feed("<html><body>503</body"), Err(HarvestError::Feed(_))));
    assert!(matches!(parse_feed("<html><body>503</body></html>"), Err(HarvestError::Feed(_))));
    assert!(matches!(parse_feed("just text"), Err(HarvestError::Feed(_))));
    assert!(parse_feed(r#"<feed xmlns="http://www.w3.org/2005/Atom"/>"#).unwrap().is_empty());
  }
}
