//! Cheap topical pre-filter applied to search results.
//!
//! This is a substring heuristic meant to drop obviously off-topic papers before they reach the
//! store. The language-model relevance check in [`crate::summarize`] is the real gate.

use super::*;

/// arXiv categories considered in-domain.
///
/// A paper passes when any of its category tags contains one of these as a substring, so
/// `cond-mat.mes-hall` also covers cross-listings that carry extra suffixes.
pub const DOMAIN_CATEGORIES: &[&str] = &[
  "quant-ph",          // Quantum Physics
  "cond-mat.mes-hall", // Mesoscale and Nanoscale Physics
  "cond-mat.str-el",   // Strongly Correlated Electrons
  "cs.ET",             // Emerging Technologies
  "math-ph",           // Mathematical Physics
  "physics.atom-ph",   // Atomic Physics
];

/// Keywords searched for, case-insensitively, in title and abstract.
pub const DOMAIN_KEYWORDS: &[&str] = &[
  "quantum",
  "qubit",
  "entanglement",
  "superposition",
  "quantum computing",
  "quantum algorithm",
  "quantum circuit",
  "quantum machine learning",
  "qml",
  "variational quantum",
  "qaoa",
  "vqe",
  "quantum annealing",
  "quantum cryptography",
  "quantum information",
  "quantum error correction",
];

/// Category to search when a caller supplies neither keywords nor a category.
pub const DEFAULT_CATEGORY: &str = "quant-ph";

/// Returns true when the paper looks in-domain by category or by keyword.
pub fn is_domain_relevant(paper: &PaperRecord) -> bool {
  let by_category = paper
    .categories
    .iter()
    .any(|category| DOMAIN_CATEGORIES.iter().any(|domain| category.contains(domain)));
  if by_category {
    return true;
  }

  let text = format!("{} {}", paper.title, paper.abstract_text).to_lowercase();
  DOMAIN_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}
