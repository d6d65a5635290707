//! Markdown rendering of stored papers.
//!
//! Three kinds of file are written into a single output directory:
//!
//! - one `<id>_<title>.md` per paper with metadata, abstract and any summaries
//! - `INDEX.md`, linking every exported paper grouped by primary category
//! - `COLLECTION_SUMMARY.md`, with category, status and per-year counts plus the newest papers
//!
//! Files are overwritten on every export; the store stays the source of truth.

use std::fmt::Write;

use super::*;
use crate::summarize::{Relevance, NOT_RELEVANT};

/// Name of the per-collection index file.
pub const INDEX_FILE: &str = "INDEX.md";

/// Name of the collection statistics file.
pub const COLLECTION_SUMMARY_FILE: &str = "COLLECTION_SUMMARY.md";

/// Maximum number of title characters kept in a file name.
const TITLE_CHARS: usize = 50;

/// Number of papers listed under "Recent Papers".
const RECENT_PAPERS: usize = 10;

/// Relevance line of a paper file.
#[derive(Debug, Clone, Copy)]
struct Verdict {
  /// `None` when no check has been made
  relevant: Option<bool>,
  /// Score shown next to it
  score:    f64,
}

/// Writes papers and collection overviews as markdown.
#[derive(Debug, Clone)]
pub struct MarkdownExporter {
  /// Directory everything is written into
  output_dir: PathBuf,
}

/// Current local time, as stamped into every generated file.
fn generated_at() -> String { chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string() }

/// `2024-03-01` style date.
fn day(dt: &DateTime<Utc>) -> String { dt.format("%Y-%m-%d").to_string() }

impl MarkdownExporter {
  /// Creates the exporter, creating `output_dir` if needed.
  pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
    let output_dir = output_dir.as_ref().to_path_buf();
    std::fs::create_dir_all(&output_dir)?;
    Ok(Self { output_dir })
  }

  /// Directory files are written into.
  pub fn output_dir(&self) -> &Path { &self.output_dir }

  /// File name for a paper: its id, then up to 50 filesystem-safe title characters.
  pub fn file_name(paper: &PaperRecord) -> String {
    let title: String = paper
      .title
      .chars()
      .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
      .map(|c| if c == ' ' { '_' } else { c })
      .take(TITLE_CHARS)
      .collect();
    let id = paper.external_id.replace('/', "_");
    format!("{id}_{title}.md")
  }

  /// Writes one paper's markdown file and returns its path.
  ///
  /// Without a fresh `relevance` verdict the file reports relevance as unknown along with the
  /// stored score.
  pub fn export_paper(
    &self,
    paper: &PaperRecord,
    methodology: Option<&str>,
    contributions: Option<&str>,
    relevance: Option<&Relevance>,
  ) -> Result<PathBuf> {
    let verdict = match relevance {
      Some(r) => Verdict { relevant: Some(r.is_relevant), score: r.score },
      None => Verdict { relevant: None, score: paper.relevance_score },
    };
    self.write_paper(paper, methodology, contributions, verdict)
  }

  /// Writes a stored paper, taking the relevance verdict from its summary.
  ///
  /// A not-relevant paper gets neither a methodology nor a contributions section.
  pub fn export_stored(&self, entry: &PaperWithSummary) -> Result<PathBuf> {
    let paper = &entry.paper;
    match &entry.summary {
      Some(summary) if entry.is_relevant_summary() => self.write_paper(
        paper,
        Some(&summary.methodology),
        Some(&summary.key_contributions),
        Verdict { relevant: Some(true), score: paper.relevance_score },
      ),
      Some(_) => {
        let verdict = Verdict { relevant: Some(false), score: paper.relevance_score };
        self.write_paper(paper, None, None, verdict)
      },
      None => {
        let verdict = Verdict { relevant: None, score: paper.relevance_score };
        self.write_paper(paper, None, None, verdict)
      },
    }
  }

  /// Renders and writes the markdown for one paper.
  fn write_paper(
    &self,
    paper: &PaperRecord,
    methodology: Option<&str>,
    contributions: Option<&str>,
    verdict: Verdict,
  ) -> Result<PathBuf> {
    let mut md = String::new();
    // Writing to a String cannot fail.
    let _ = write!(
      md,
      "# {title}

## Metadata

- **ArXiv ID**: [{id}]({abs})
- **PDF Link**: [{pdf}]({pdf})
- **Authors**: {authors}
- **Categories**: {categories}
- **Published**: {published}
- **Updated**: {updated}

---

## Abstract

{abstract_text}

---
",
      title = paper.title,
      id = paper.external_id,
      abs = paper.abstract_link,
      pdf = paper.pdf_link,
      authors = paper.authors.join(", "),
      categories = paper.categories.join(", "),
      published = paper.published.to_rfc3339(),
      updated = paper.updated.to_rfc3339(),
      abstract_text = if paper.abstract_text.is_empty() {
        "No abstract available."
      } else {
        paper.abstract_text.as_str()
      },
    );

    if let Some(contributions) = contributions.filter(|c| !c.trim().is_empty()) {
      let _ = write!(md, "\n## Key Contributions\n\n{contributions}\n\n---\n");
    }
    if let Some(methodology) = methodology.filter(|m| !m.trim().is_empty()) {
      let _ = write!(md, "\n## Methodology Summary\n\n{methodology}\n\n---\n");
    }

    let relevant = match verdict.relevant {
      Some(true) => "Yes",
      Some(false) => "No",
      None => "Unknown",
    };
    let score = verdict.score;
    let _ = write!(
      md,
      "\n## Export Information\n\n- **Exported**: {}\n- **Relevant**: {relevant}\n- **Relevance \
       Score**: {score:.2}\n",
      generated_at()
    );

    let path = self.output_dir.join(Self::file_name(paper));
    std::fs::write(&path, md)?;
    debug!("Exported {} to {}", paper.external_id, path.display());
    Ok(path)
  }

  /// Exports every paper and, if at least one file was written, an [`INDEX_FILE`].
  ///
  /// A paper that fails to export is logged and skipped.
  pub fn export_many(&self, papers: &[PaperWithSummary]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(papers.len());
    for entry in papers {
      match self.export_stored(entry) {
        Ok(path) => written.push(path),
        Err(e) => error!("Failed to export {}: {e}", entry.paper.external_id),
      }
    }

    if !written.is_empty() {
      self.index(papers)?;
    }
    Ok(written)
  }

  /// Writes [`INDEX_FILE`] listing `papers` grouped by primary category.
  pub fn index(&self, papers: &[PaperWithSummary]) -> Result<PathBuf> {
    let mut by_category: BTreeMap<&str, Vec<&PaperWithSummary>> = BTreeMap::new();
    for entry in papers {
      by_category.entry(entry.paper.primary_category().unwrap_or("Unknown")).or_default().push(entry);
    }

    let mut md = format!(
      "# ArXiv Papers Index\n\n**Generated**: {}\n\n**Total Papers**: {}\n\n---\n\n## Papers\n\n",
      generated_at(),
      papers.len()
    );

    for (category, entries) in by_category {
      let _ = write!(md, "\n### {category}\n\n");
      for entry in entries {
        let paper = &entry.paper;
        let status = match &entry.summary {
          Some(s) if s.methodology == NOT_RELEVANT => "➖ Not relevant",
          Some(_) => "✅ Summarized",
          None => "⏳ Not summarized",
        };
        let _ = write!(
          md,
          "- [{title}]({file})\n  - ArXiv: [{id}]({abs})\n  - Published: {published}\n  - \
           Status: {status}\n\n",
          title = paper.title,
          file = Self::file_name(paper),
          id = paper.external_id,
          abs = paper.abstract_link,
          published = day(&paper.published),
        );
      }
    }

    let path = self.output_dir.join(INDEX_FILE);
    std::fs::write(&path, md)?;
    info!("Index created at {}", path.display());
    Ok(path)
  }

  /// Writes [`COLLECTION_SUMMARY_FILE`] with statistics over `papers`.
  pub fn collection_summary(&self, papers: &[PaperRecord]) -> Result<PathBuf> {
    let mut md = format!(
      "# Papers Collection Summary\n\n**Generated**: {}\n\n**Total Papers**: {}\n\n---\n\n## \
       Statistics\n\n",
      generated_at(),
      papers.len()
    );

    let mut category_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for category in papers.iter().flat_map(|p| p.categories.iter()) {
      *category_counts.entry(category.as_str()).or_default() += 1;
    }
    let mut category_counts: Vec<_> = category_counts.into_iter().collect();
    category_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    md.push_str("### Papers by Category\n\n");
    for (category, count) in category_counts {
      let _ = writeln!(md, "- **{category}**: {count} papers");
    }

    let processed = papers.iter().filter(|p| p.processed).count();
    let _ = write!(
      md,
      "\n### Processing Status\n\n- Processed: {processed}\n- Unprocessed: {}\n",
      papers.len() - processed
    );

    let mut years: BTreeMap<String, usize> = BTreeMap::new();
    for paper in papers {
      *years.entry(paper.published.format("%Y").to_string()).or_default() += 1;
    }
    md.push_str("\n### Papers by Year\n\n");
    for (year, count) in years.iter().rev() {
      let _ = writeln!(md, "- **{year}**: {count} papers");
    }

    md.push_str("\n---\n\n## Recent Papers\n\n");
    let mut recent: Vec<&PaperRecord> = papers.iter().collect();
    recent.sort_by(|a, b| b.published.cmp(&a.published));
    for (i, paper) in recent.into_iter().take(RECENT_PAPERS).enumerate() {
      let _ = write!(
        md,
        "{n}. **{title}**\n   - ArXiv: [{id}]({abs})\n   - Published: {published}\n\n",
        n = i + 1,
        title = paper.title,
        id = paper.external_id,
        abs = paper.abstract_link,
        published = day(&paper.published),
      );
    }

    let path = self.output_dir.join(COLLECTION_SUMMARY_FILE);
    std::fs::write(&path, md)?;
    info!("Collection summary created at {}", path.display());
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn paper(id: &str, title: &str, year: i32, categories: &[&str]) -> PaperRecord {
    let published = Utc.with_ymd_and_hms(year, 1, 15, 0, 0, 0).unwrap();
    PaperRecord::new(id, title, "An abstract.", published)
      .with_authors(["Ada", "Grace"])
      .with_categories(categories.iter().copied())
  }

  fn summary(methodology: &str) -> Summary {
    Summary {
      id:                1,
      paper_id:          1,
      methodology:       methodology.into(),
      key_contributions: "- one".into(),
      extracted_text:    None,
      created_at:        Utc::now(),
    }
  }

  #[test]
  fn test_file_name_sanitization() {
    let p = paper("2401.00001v1", "Qubits: fast & (very) cheap!", 2024, &[]);
    assert_eq!(MarkdownExporter::file_name(&p), "2401.00001v1_Qubits_fast__very_cheap.md");

    let long = paper("quant-ph/0101001", &"a".repeat(80), 2001, &[]);
    assert_eq!(MarkdownExporter::file_name(&long), format!("quant-ph_0101001_{}.md", "a".repeat(50)));
  }

  #[test]
  fn test_export_paper_sections() {
    let dir = tempdir().unwrap();
    let exporter = MarkdownExporter::new(dir.path().join("out")).unwrap();
    let p = paper("2401.00001v1", "Routing", 2024, &["quant-ph"]);

    let path = exporter.export_paper(&p, Some("Method text"), Some("- contribution"), None).unwrap();
    let md = std::fs::read_to_string(path).unwrap();
    assert!(md.starts_with("# Routing\n"));
    assert!(md.contains("- **ArXiv ID**: [2401.00001v1](https://arxiv.org/abs/2401.00001v1)"));
    assert!(md.contains("- **Authors**: Ada, Grace"));
    assert!(md.contains("## Key Contributions\n\n- contribution"));
    assert!(md.contains("## Methodology Summary\n\nMethod text"));
    assert!(md.contains("- **Relevant**: Unknown"));

    let bare = exporter.export_paper(&p, None, None, None).unwrap();
    let md = std::fs::read_to_string(bare).unwrap();
    assert!(!md.contains("## Methodology Summary"));
  }

  #[test]
  fn test_export_many_writes_grouped_index() {
    let dir = tempdir().unwrap();
    let exporter = MarkdownExporter::new(dir.path()).unwrap();
    let mut papers = vec![
      PaperWithSummary {
        paper:   paper("1", "First", 2024, &["quant-ph"]),
        summary: Some(summary("Method")),
      },
      PaperWithSummary { paper: paper("2", "Second", 2024, &["cs.ET"]), summary: None },
      PaperWithSummary {
        paper:   paper("3", "Third", 2023, &["quant-ph"]),
        summary: Some(summary(NOT_RELEVANT)),
      },
    ];

    papers[0].paper.relevance_score = 0.91;
    papers[2].paper.relevance_score = 0.12;

    let written = exporter.export_many(&papers).unwrap();
    assert_eq!(written.len(), 3);

    let relevant = std::fs::read_to_string(dir.path().join("1_First.md")).unwrap();
    assert!(relevant.contains("## Methodology Summary\n\nMethod"));
    assert!(relevant.contains("## Key Contributions\n\n- one"));
    assert!(relevant.contains("- **Relevant**: Yes\n- **Relevance Score**: 0.91"));

    let not_relevant = std::fs::read_to_string(dir.path().join("3_Third.md")).unwrap();
    assert!(!not_relevant.contains("## Methodology Summary"));
    assert!(!not_relevant.contains("## Key Contributions"));
    assert!(!not_relevant.contains(NOT_RELEVANT));
    assert!(not_relevant.contains("- **Relevant**: No\n- **Relevance Score**: 0.12"));

    let pending = std::fs::read_to_string(dir.path().join("2_Second.md")).unwrap();
    assert!(pending.contains("- **Relevant**: Unknown"));

    let index = std::fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
    assert!(index.contains("**Total Papers**: 3"));
    let cs = index.find("### cs.ET").unwrap();
    let qp = index.find("### quant-ph").unwrap();
    assert!(cs < qp);
    assert!(index.contains("- [First](1_First.md)"));
    assert!(index.contains("✅ Summarized"));
    assert!(index.contains("⏳ Not summarized"));
    assert!(index.contains("➖ Not relevant"));
  }

  #[test]
  fn test_collection_summary_statistics() {
    let dir = tempdir().unwrap();
    let exporter = MarkdownExporter::new(dir.path()).unwrap();
    let mut papers: Vec<_> = (0..12)
      .map(|i| paper(&format!("p{i}"), &format!("Paper {i}"), 2012 + i, &["quant-ph", "cs.ET"]))
      .collect();
    papers[0].processed = true;
    papers[1].categories = vec!["math-ph".into()];

    let md = std::fs::read_to_string(exporter.collection_summary(&papers).unwrap()).unwrap();
    assert!(md.contains("- **quant-ph**: 11 papers"));
    assert!(md.contains("- **math-ph**: 1 papers"));
    assert!(md.contains("- Processed: 1\n- Unprocessed: 11"));
    assert!(md.contains("- **2023**: 1 papers"));
    assert!(md.find("**2023**").unwrap() < md.find("**2012**").unwrap());
    assert!(md.contains("1. **Paper 11**"));
    assert!(md.contains("10. **Paper 2**"));
    assert!(!md.contains("**Paper 1**\n"));
  }
}
