//! In-memory fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use hybridrank_common::errors::{AppError, Result};
use hybridrank_common::stores::{LinkGraphStore, SearchHistoryStore};
use hybridrank_common::types::{sort_and_rank, LinkEdge, Node, ScoredNode};
use hybridrank_search::retrieval::{Bm25Params, Bm25Retriever, RetrievalRequest, Retriever, UnicodeTokenizer};
use hybridrank_search::NodeStore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn campus_corpus() -> Arc<NodeStore> {
    Arc::new(NodeStore::from_nodes([
        Node::new("1", "南开大学图书馆开放时间")
            .with_title("图书馆开放时间")
            .with_url("https://lib.nankai.edu.cn/hours")
            .with_platform("website"),
        Node::new("2", "南开大学计算机学院招生")
            .with_title("计算机学院招生")
            .with_url("https://cc.nankai.edu.cn/admission")
            .with_platform("wechat"),
        Node::new("3", "天津大学新闻中心")
            .with_title("天大新闻")
            .with_url("https://news.tju.edu.cn")
            .with_platform("website"),
        Node::new("4", "南开中学校园活动")
            .with_title("南开中学")
            .with_url("https://nkzx.example.cn")
            .with_platform("wechat"),
        Node::new("5", "北京大学图书馆")
            .with_title("北大图书馆")
            .with_url("https://lib.pku.edu.cn")
            .with_platform("website"),
    ]))
}

pub fn bm25(nodes: &Arc<NodeStore>) -> Arc<Bm25Retriever> {
    Arc::new(
        Bm25Retriever::new(
            nodes.snapshot(),
            Arc::new(UnicodeTokenizer::new(Vec::<String>::new())),
            Bm25Params::default(),
            usize::MAX,
        )
        .with_store(nodes.clone()),
    )
}

/// Dense stand-in: fraction of query characters present in the text
pub struct OverlapDense {
    pub nodes: Arc<NodeStore>,
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl OverlapDense {
    pub fn new(nodes: Arc<NodeStore>) -> Self {
        Self {
            nodes,
            calls: AtomicUsize::new(0),
            delay: None,
            fail: false,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for OverlapDense {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ScoredNode>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AppError::retrieval("dense", "vector store unreachable"));
        }

        let query: HashSet<char> = request.query.chars().filter(|c| !c.is_whitespace()).collect();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut results: Vec<ScoredNode> = self
            .nodes
            .snapshot()
            .into_iter()
            .filter(|node| request.filter.as_ref().map_or(true, |f| f.matches(&node.metadata)))
            .filter_map(|node| {
                let hits = query.iter().filter(|c| node.text.contains(**c)).count();
                (hits > 0).then(|| ScoredNode::new(node, hits as f64 / query.len() as f64))
            })
            .collect();
        sort_and_rank(&mut results);
        results.truncate(request.top_k);
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}

/// Counts calls into any retriever
pub struct Counting {
    pub inner: Arc<dyn Retriever>,
    pub calls: AtomicUsize,
}

impl Counting {
    pub fn new(inner: Arc<dyn Retriever>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for Counting {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ScoredNode>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.retrieve(request).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Fixed per-user history
#[derive(Default)]
pub struct MemoryHistory {
    pub queries: HashMap<String, Vec<String>>,
}

impl MemoryHistory {
    pub fn with(user: &str, queries: &[&str]) -> Self {
        let mut history = Self::default();
        history
            .queries
            .insert(user.to_string(), queries.iter().map(|q| q.to_string()).collect());
        history
    }
}

#[async_trait]
impl SearchHistoryStore for MemoryHistory {
    async fn recent_queries(&self, user_id: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .queries
            .get(user_id)
            .map(|q| q.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Link store holding edges and the last persisted scores
#[derive(Default)]
pub struct MemoryLinks {
    pub edges: Vec<LinkEdge>,
    pub scores: Mutex<HashMap<String, f64>>,
}

#[async_trait]
impl LinkGraphStore for MemoryLinks {
    async fn load_edges(&self) -> Result<Vec<LinkEdge>> {
        Ok(self.edges.clone())
    }

    async fn upsert_authority(&self, url: &str, score: f64) -> Result<()> {
        self.scores
            .lock()
            .map_err(|e| AppError::Internal { message: e.to_string() })?
            .insert(url.to_string(), score);
        Ok(())
    }
}
