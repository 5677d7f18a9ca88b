//! In-memory corpus
//!
//! Read-mostly map of nodes with a url index. Nodes are immutable `Arc`s;
//! an authority update swaps in a new `Arc` so readers holding the old one
//! are never disturbed.

use async_trait::async_trait;
use dashmap::DashMap;
use hybridrank_common::db::PgStore;
use hybridrank_common::errors::Result;
use hybridrank_common::stores::NodeMetadataStore;
use hybridrank_common::types::{sanitize_score, Node, NodeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared node store
#[derive(Default)]
pub struct NodeStore {
    nodes: DashMap<NodeId, (u64, Arc<Node>)>,
    by_url: DashMap<String, Vec<NodeId>>,
    next_seq: AtomicU64,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let store = Self::new();
        for node in nodes {
            store.insert(node);
        }
        store
    }

    /// Load the whole corpus from Postgres
    pub async fn load(pg: &PgStore) -> Result<Self> {
        let store = Self::from_nodes(pg.load_documents().await?);
        info!(documents = store.len(), "Node store loaded");
        Ok(store)
    }

    /// Insert or replace a node; replacing keeps its corpus position
    pub fn insert(&self, node: Node) {
        let id = node.id.clone();
        let url = node.metadata.url.clone();
        let seq = match self.nodes.get(&id) {
            Some(existing) => {
                let (seq, old) = existing.value();
                let old_url = old.metadata.url.clone();
                let seq = *seq;
                drop(existing);
                if old_url != url {
                    self.unindex_url(&old_url, &id);
                }
                seq
            }
            None => self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        if !url.is_empty() {
            let mut ids = self.by_url.entry(url).or_default();
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }
        self.nodes.insert(id, (seq, Arc::new(node)));
    }

    fn unindex_url(&self, url: &str, id: &NodeId) {
        if let Some(mut ids) = self.by_url.get_mut(url) {
            ids.retain(|existing| existing != id);
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<Node>> {
        self.nodes.get(id).map(|entry| entry.value().1.clone())
    }

    pub fn by_url(&self, url: &str) -> Vec<Arc<Node>> {
        self.by_url
            .get(url)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion order
    pub fn snapshot(&self) -> Vec<Arc<Node>> {
        let mut entries: Vec<(u64, Arc<Node>)> = self
            .nodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, node)| node).collect()
    }

    /// Set authority on every node sharing `url`; returns nodes touched
    pub fn set_authority(&self, url: &str, score: f64) -> u64 {
        let ids = match self.by_url.get(url) {
            Some(ids) => ids.clone(),
            None => return 0,
        };

        let mut touched = 0;
        for id in ids {
            if let Some(mut entry) = self.nodes.get_mut(&id) {
                let mut updated = (*entry.1).clone();
                updated.metadata.authority_score = sanitize_score(score);
                entry.1 = Arc::new(updated);
                touched += 1;
            }
        }
        touched
    }
}

#[async_trait]
impl NodeMetadataStore for NodeStore {
    async fn get(&self, id: &NodeId) -> Result<Option<Node>> {
        Ok(NodeStore::get(self, id).map(|node| (*node).clone()))
    }

    async fn update_authority(&self, url: &str, score: f64) -> Result<u64> {
        Ok(self.set_authority(url, score))
    }
}
