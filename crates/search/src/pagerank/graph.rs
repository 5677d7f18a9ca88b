//! Hyperlink graph
//!
//! Urls are interned to dense indices. Duplicate edges collapse into one;
//! self-loops are kept and count toward the source's out-degree.

use hybridrank_common::types::LinkEdge;
use std::collections::{HashMap, HashSet};

/// In-memory directed link graph
#[derive(Debug, Default)]
pub struct LinkGraph {
    urls: Vec<String>,
    index: HashMap<String, usize>,
    /// Adjacency list: node -> nodes it links to
    outgoing: Vec<Vec<usize>>,
    /// Reverse adjacency: node -> nodes linking to it
    incoming: Vec<Vec<usize>>,
    edges: HashSet<(usize, usize)>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a LinkEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_edge(&edge.source_url, &edge.target_url);
        }
        graph
    }

    fn intern(&mut self, url: &str) -> usize {
        if let Some(&id) = self.index.get(url) {
            return id;
        }
        let id = self.urls.len();
        self.urls.push(url.to_string());
        self.index.insert(url.to_string(), id);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Add an edge; returns false if it was already present
    pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
        let s = self.intern(source);
        let t = self.intern(target);
        if !self.edges.insert((s, t)) {
            return false;
        }
        self.outgoing[s].push(t);
        self.incoming[t].push(s);
        true
    }

    pub fn node_count(&self) -> usize {
        self.urls.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn url(&self, node: usize) -> &str {
        &self.urls[node]
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn index_of(&self, url: &str) -> Option<usize> {
        self.index.get(url).copied()
    }

    /// Nodes linking to `node`
    pub fn incoming(&self, node: usize) -> &[usize] {
        &self.incoming[node]
    }

    pub fn outgoing(&self, node: usize) -> &[usize] {
        &self.outgoing[node]
    }

    pub fn out_degree(&self, node: usize) -> usize {
        self.outgoing[node].len()
    }

    pub fn in_degree(&self, node: usize) -> usize {
        self.incoming[node].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_construction() {
        let graph = LinkGraph::from_edges(&[LinkEdge::new("a", "b"), LinkEdge::new("b", "c")]);

        assert_eq!(graph.node_count(), 3);
        let (a, b, c) = (
            graph.index_of("a").unwrap(),
            graph.index_of("b").unwrap(),
            graph.index_of("c").unwrap(),
        );
        assert_eq!(graph.outgoing(a), &[b]);
        assert_eq!(graph.incoming(b), &[a]);
        assert_eq!(graph.outgoing(b), &[c]);
        assert_eq!(graph.out_degree(c), 0);
    }

    #[test]
    fn test_duplicates_collapse_and_self_loops_stay() {
        let mut graph = LinkGraph::new();
        assert!(graph.add_edge("a", "b"));
        assert!(!graph.add_edge("a", "b"));
        assert!(graph.add_edge("a", "a"));

        let a = graph.index_of("a").unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.out_degree(a), 2);
        assert_eq!(graph.in_degree(a), 1);
    }
}
