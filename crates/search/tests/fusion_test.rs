//! Order-independence of reciprocal rank fusion over shuffled inputs.

use hybridrank_common::types::{sort_and_rank, Node, ScoredNode};
use hybridrank_search::retrieval::Fusion;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

fn random_list(rng: &mut impl Rng, pool: &[Arc<Node>], len: usize) -> Vec<ScoredNode> {
    let mut picked: Vec<Arc<Node>> = pool.choose_multiple(rng, len).cloned().collect();
    picked.shuffle(rng);
    let mut list: Vec<ScoredNode> = picked
        .into_iter()
        .enumerate()
        .map(|(i, node)| ScoredNode::new(node, (len - i) as f64))
        .collect();
    sort_and_rank(&mut list);
    list
}

#[test]
fn test_rrf_ignores_list_order() {
    let mut rng = rand::thread_rng();
    let pool: Vec<Arc<Node>> = (0..40u64).map(|i| Arc::new(Node::new(i, format!("doc {i}")))).collect();
    let fusion = Fusion::rrf(60.0);

    for _ in 0..50 {
        let mut lists: Vec<Vec<ScoredNode>> = (0..4)
            .map(|_| {
                let len = rng.gen_range(0..15);
                random_list(&mut rng, &pool, len)
            })
            .collect();
        let reference = fusion.fuse(lists.clone(), 20);

        lists.shuffle(&mut rng);
        let shuffled = fusion.fuse(lists, 20);

        assert_eq!(reference.len(), shuffled.len());
        for (a, b) in reference.iter().zip(&shuffled) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.score, b.score);
        }
        assert!(reference.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
