//! Integration tests for the authority job feeding the search pipeline.

mod common;

use common::{bm25, MemoryLinks};
use hybridrank_common::config::{PageRankConfig, RerankConfig, RetrievalConfig};
use hybridrank_common::strategy::{RerankStrategy, Strategy};
use hybridrank_common::types::{LinkEdge, Node};
use hybridrank_search::{AuthorityJob, NodeStore, Reranker, RetrieverRegistry, SearchPipeline, SearchRequest};
use std::sync::Arc;

fn notices() -> Arc<NodeStore> {
    Arc::new(NodeStore::from_nodes([
        Node::new("a", "南开 新闻 校园").with_url("u/a"),
        Node::new("b", "南开 通知 教务").with_url("u/b"),
        Node::new("c", "南开 公告 后勤").with_url("u/c"),
        Node::new("b-mirror", "南开 通知 镜像").with_url("u/b"),
    ]))
}

#[tokio::test]
async fn test_authority_flows_into_pagerank_rerank() {
    let nodes = notices();
    let links = Arc::new(MemoryLinks {
        edges: vec![
            LinkEdge::new("u/a", "u/b"),
            LinkEdge::new("u/c", "u/b"),
            LinkEdge::new("u/b", "u/a"),
            LinkEdge::new("u/external", "u/c"),
        ],
        ..MemoryLinks::default()
    });

    let registry = Arc::new(RetrieverRegistry::builder(nodes.clone()).bm25(bm25(&nodes)).build());
    let pipeline = SearchPipeline::new(
        registry,
        Arc::new(Reranker::new(&RerankConfig::default(), 0.1)),
        RetrievalConfig::default(),
    );
    let request = SearchRequest::new("南开")
        .with_strategy(Strategy::Sparse)
        .with_rerank(RerankStrategy::PageRankOnly);

    let before = pipeline.search(&request).await.unwrap();
    assert_eq!(before.results.len(), 4);
    assert!(before.results.iter().all(|r| r.score == 0.0));

    let job = AuthorityJob::new(links.clone(), nodes.clone(), &PageRankConfig::default());
    let report = job.run().await.unwrap();
    assert_eq!(report.nodes, 4);
    assert!(report.converged);
    // both nodes sharing u/b are updated
    assert_eq!(report.integrated, 4);

    let persisted = links.scores.lock().unwrap().clone();
    let total: f64 = persisted.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(persisted["u/b"] > persisted["u/a"]);

    let b = nodes.get(&"b".into()).unwrap();
    assert_eq!(b.metadata.authority_score, persisted["u/b"]);

    // scores are visible without rebuilding the sparse index
    let fresh = pipeline.search(&request).await.unwrap();
    let ids: Vec<&str> = fresh.results.iter().map(|r| r.id().as_str()).collect();
    assert_eq!(&ids[..2], &["b", "b-mirror"]);
    assert_eq!(fresh.results[0].score, persisted["u/b"]);
    assert_eq!(fresh.results[1].score, persisted["u/b"]);
    assert_eq!(ids[2], "a");

    assert_eq!(pipeline.refresh_corpus().await.unwrap(), Some(4));
}
