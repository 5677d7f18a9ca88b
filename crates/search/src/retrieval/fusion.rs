//! Ranked-list fusion
//!
//! RRF merges lists whose scores are not comparable by using ranks only.
//! Score union is for lists known to share a score scale.

use hybridrank_common::config::{FusionConfig, FusionMode};
use hybridrank_common::types::{by_score_desc, Node, NodeId, ScoredNode};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Configured list merger
#[derive(Debug, Clone, Copy)]
pub struct Fusion {
    pub mode: FusionMode,
    pub k: f64,
    pub authority_weight: f64,
}

impl Default for Fusion {
    fn default() -> Self {
        Self::from(&FusionConfig::default())
    }
}

impl From<&FusionConfig> for Fusion {
    fn from(config: &FusionConfig) -> Self {
        Self {
            mode: config.mode,
            k: config.rrf_k,
            authority_weight: config.authority_weight,
        }
    }
}

impl Fusion {
    pub fn rrf(k: f64) -> Self {
        Self {
            mode: FusionMode::Rrf,
            k,
            authority_weight: 0.0,
        }
    }

    pub fn score_union() -> Self {
        Self {
            mode: FusionMode::ScoreUnion,
            ..Self::default()
        }
    }

    /// Merge ranked lists into one, best first, at most `top_k` long
    pub fn fuse(&self, lists: Vec<Vec<ScoredNode>>, top_k: usize) -> Vec<ScoredNode> {
        let mut fused = match self.mode {
            FusionMode::Rrf => self.reciprocal_rank(lists),
            FusionMode::ScoreUnion => Self::union_by_score(lists),
        };
        fused.truncate(top_k);
        for (i, node) in fused.iter_mut().enumerate() {
            node.rank = Some(i + 1);
        }
        fused
    }

    fn reciprocal_rank(&self, lists: Vec<Vec<ScoredNode>>) -> Vec<ScoredNode> {
        let mut contributions: HashMap<NodeId, (Arc<Node>, Vec<f64>)> = HashMap::new();

        for list in lists.into_iter().filter(|l| !l.is_empty()) {
            let mut seen: HashSet<NodeId> = HashSet::with_capacity(list.len());
            for (position, item) in list.into_iter().enumerate() {
                // a list may repeat a node; only its best rank counts
                if !seen.insert(item.id().clone()) {
                    continue;
                }
                let rank = (position + 1) as f64;
                let mut contribution = 1.0 / (rank + self.k);
                if self.authority_weight != 0.0 {
                    contribution += self.authority_weight * item.node.metadata.authority_score;
                }
                contributions
                    .entry(item.id().clone())
                    .or_insert_with(|| (item.node.clone(), Vec::new()))
                    .1
                    .push(contribution);
            }
        }

        let mut fused: Vec<ScoredNode> = contributions
            .into_values()
            .map(|(node, mut parts)| {
                // summing in a fixed order makes the result independent of list order
                parts.sort_by(|a, b| a.total_cmp(b));
                ScoredNode::new(node, parts.iter().sum())
            })
            .collect();

        fused.sort_by(|a, b| by_score_desc(a, b).then_with(|| a.id().cmp(b.id())));
        fused
    }

    fn union_by_score(lists: Vec<Vec<ScoredNode>>) -> Vec<ScoredNode> {
        // per distinct text keep the highest score, lowest id on ties
        let mut best: HashMap<String, ScoredNode> = HashMap::new();
        for mut item in lists.into_iter().flatten() {
            item.rank = None;
            match best.get_mut(item.text()) {
                Some(kept) => {
                    if by_score_desc(&item, kept).then_with(|| item.id().cmp(kept.id())).is_lt() {
                        *kept = item;
                    }
                }
                None => {
                    best.insert(item.text().to_string(), item);
                }
            }
        }

        let mut merged: Vec<ScoredNode> = best.into_values().collect();
        merged.sort_by(|a, b| by_score_desc(a, b).then_with(|| a.id().cmp(b.id())));
        merged
    }
}
