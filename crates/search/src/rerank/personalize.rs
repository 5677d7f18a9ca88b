//! History-based boosting

use hybridrank_common::types::ScoredNode;

/// Boost for each candidate whose text contains any history term
///
/// Matching is a case-insensitive substring test. A candidate is boosted
/// once no matter how many terms match. Blank terms are ignored.
pub fn history_boosts(candidates: &[ScoredNode], history: &[String], boost: f64) -> Vec<f64> {
    let terms: Vec<String> = history
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    if terms.is_empty() {
        return vec![0.0; candidates.len()];
    }

    candidates
        .iter()
        .map(|candidate| {
            let text = candidate.text().to_lowercase();
            if terms.iter().any(|term| text.contains(term.as_str())) {
                boost
            } else {
                0.0
            }
        })
        .collect()
}
