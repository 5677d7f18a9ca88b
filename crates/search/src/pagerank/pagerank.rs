//! PageRank by power iteration
//!
//! Mass held by dangling nodes is spread uniformly every round, so scores
//! stay a probability distribution. Scores are not rescaled.

use super::LinkGraph;
use hybridrank_common::config::PageRankConfig;

/// Iteration parameters
#[derive(Debug, Clone, Copy)]
pub struct PageRank {
    /// Damping factor (typically 0.85)
    pub damping: f64,
    pub max_iterations: usize,
    /// L1 change below which iteration stops
    pub tolerance: f64,
}

impl Default for PageRank {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

impl From<&PageRankConfig> for PageRank {
    fn from(config: &PageRankConfig) -> Self {
        Self {
            damping: config.damping,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

/// Outcome of one computation; `scores` is indexed like the graph's nodes
#[derive(Debug, Clone)]
pub struct PageRankResult {
    pub scores: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// L1 change of the last round
    pub delta: f64,
}

impl PageRankResult {
    /// Pair each url with its score, highest first
    pub fn ranked<'g>(&self, graph: &'g LinkGraph) -> Vec<(&'g str, f64)> {
        let mut ranked: Vec<(&str, f64)> = graph
            .urls()
            .iter()
            .map(String::as_str)
            .zip(self.scores.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

impl PageRank {
    pub fn compute(&self, graph: &LinkGraph) -> PageRankResult {
        let n = graph.node_count();
        if n == 0 {
            return PageRankResult {
                scores: Vec::new(),
                iterations: 0,
                converged: true,
                delta: 0.0,
            };
        }

        let n_f = n as f64;
        let alpha = self.damping;
        let teleport = (1.0 - alpha) / n_f;
        let dangling: Vec<usize> = (0..n).filter(|&i| graph.out_degree(i) == 0).collect();

        let mut scores = vec![1.0 / n_f; n];
        let mut next = vec![0.0; n];
        let mut iterations = 0;
        let mut delta = f64::INFINITY;

        while iterations < self.max_iterations {
            let dangling_mass: f64 = dangling.iter().map(|&i| scores[i]).sum();
            let base = teleport + alpha * dangling_mass / n_f;

            for (node, slot) in next.iter_mut().enumerate() {
                let inbound: f64 = graph
                    .incoming(node)
                    .iter()
                    .map(|&src| scores[src] / graph.out_degree(src) as f64)
                    .sum();
                *slot = base + alpha * inbound;
            }

            delta = scores.iter().zip(&next).map(|(old, new)| (old - new).abs()).sum();
            std::mem::swap(&mut scores, &mut next);
            iterations += 1;

            if delta < self.tolerance {
                return PageRankResult {
                    scores,
                    iterations,
                    converged: true,
                    delta,
                };
            }
        }

        PageRankResult {
            scores,
            iterations,
            converged: false,
            delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridrank_common::types::LinkEdge;

    fn graph(edges: &[(&str, &str)]) -> LinkGraph {
        let edges: Vec<LinkEdge> = edges.iter().map(|(s, t)| LinkEdge::new(*s, *t)).collect();
        LinkGraph::from_edges(&edges)
    }

    fn score(graph: &LinkGraph, result: &PageRankResult, url: &str) -> f64 {
        result.scores[graph.index_of(url).unwrap()]
    }

    #[test]
    fn test_scores_sum_to_one() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("d", "a"), ("d", "c")]);
        let result = PageRank::default().compute(&g);
        let total: f64 = result.scores.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(result.converged);
    }

    #[test]
    fn test_node_without_inbound_gets_teleport_mass() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("d", "a")]);
        let result = PageRank::default().compute(&g);
        assert!((score(&g, &result, "d") - 0.15 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_dangling_mass_is_redistributed() {
        let g = graph(&[("a", "b")]);
        let result = PageRank::default().compute(&g);
        let (a, b) = (score(&g, &result, "a"), score(&g, &result, "b"));
        assert!((a + b - 1.0).abs() < 1e-9);
        assert!(b > a);
        // stationary point: a = (1-α)/2 + α·b/2
        assert!((a - (0.075 + 0.425 * b)).abs() < 1e-6);
    }

    #[test]
    fn test_symmetric_cycle_is_uniform() {
        let g = graph(&[("a", "b"), ("b", "a")]);
        let result = PageRank::default().compute(&g);
        assert!((score(&g, &result, "a") - 0.5).abs() < 1e-12);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_max_iterations_bound() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("d", "a")]);
        let pagerank = PageRank {
            max_iterations: 2,
            tolerance: 0.0,
            ..PageRank::default()
        };
        let result = pagerank.compute(&g);
        assert_eq!(result.iterations, 2);
        assert!(!result.converged);
    }

    #[test]
    fn test_empty_graph() {
        let result = PageRank::default().compute(&LinkGraph::new());
        assert!(result.scores.is_empty());
        assert!(result.converged);
    }

    #[test]
    fn test_ranked_orders_by_score() {
        let g = graph(&[("a", "b"), ("c", "b")]);
        let result = PageRank::default().compute(&g);
        assert_eq!(result.ranked(&g)[0].0, "b");
    }
}
