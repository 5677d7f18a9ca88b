//! In-process BM25 lexical retrieval
//!
//! The index is an immutable snapshot behind an `Arc`. Rebuilding constructs
//! a new snapshot off the async executor and swaps the shared reference;
//! in-flight queries keep scoring against the snapshot they started with.
//! Hits are resolved against the live node store, so authority updates
//! show up without a rebuild.

use super::{MetadataFilter, RetrievalRequest, Retriever};
use crate::store::NodeStore;
use hybridrank_common::config::Bm25Config;
use hybridrank_common::errors::{AppError, Result};
use hybridrank_common::types::{sort_and_rank, Node, ScoredNode};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

/// Token standing in for documents with no indexable terms
pub const EMPTY_DOC_TOKEN: &str = "<empty>";

/// Splits text into index terms
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Unicode word segmentation with per-ideograph CJK tokens
///
/// Words are lowercased. Runs of Han or kana characters are split into one
/// token per character, since they carry no whitespace word boundaries.
#[derive(Debug, Clone, Default)]
pub struct UnicodeTokenizer {
    stopwords: HashSet<String>,
}

impl UnicodeTokenizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stopwords: stopwords.into_iter().map(|s| s.into().to_lowercase()).collect(),
        }
    }

    fn push(&self, out: &mut Vec<String>, token: String) {
        if !token.is_empty() && !self.stopwords.contains(&token) {
            out.push(token);
        }
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF     // hiragana, katakana
        | 0x3400..=0x4DBF   // CJK extension A
        | 0x4E00..=0x9FFF   // CJK unified ideographs
        | 0xF900..=0xFAFF   // compatibility ideographs
        | 0x20000..=0x2A6DF // extension B
    )
}

impl Tokenizer for UnicodeTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for word in text.unicode_words() {
            let lower = word.to_lowercase();
            let mut run = String::new();
            for c in lower.chars() {
                if is_cjk(c) {
                    self.push(&mut tokens, std::mem::take(&mut run));
                    self.push(&mut tokens, c.to_string());
                } else {
                    run.push(c);
                }
            }
            self.push(&mut tokens, run);
        }
        tokens
    }
}

/// Okapi BM25 saturation and length normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl From<&Bm25Config> for Bm25Params {
    fn from(config: &Bm25Config) -> Self {
        Self {
            k1: config.k1,
            b: config.b,
        }
    }
}

/// Immutable inverted index over a corpus snapshot
pub struct Bm25Index {
    docs: Vec<Arc<Node>>,
    /// term -> (doc index, term frequency), ascending by doc index
    postings: HashMap<String, Vec<(u32, u32)>>,
    doc_lens: Vec<u32>,
    avgdl: f64,
    params: Bm25Params,
}

impl Bm25Index {
    pub fn build(docs: Vec<Arc<Node>>, tokenizer: &dyn Tokenizer, params: Bm25Params) -> Self {
        let mut postings: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
        let mut doc_lens = Vec::with_capacity(docs.len());

        for (idx, doc) in docs.iter().enumerate() {
            let mut tokens = tokenizer.tokenize(&doc.text);
            if tokens.is_empty() {
                tokens.push(EMPTY_DOC_TOKEN.to_string());
            }
            doc_lens.push(tokens.len() as u32);

            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push((idx as u32, count));
            }
        }

        let total: u64 = doc_lens.iter().map(|&l| l as u64).sum();
        let avgdl = if doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / doc_lens.len() as f64
        };

        Self {
            docs,
            postings,
            doc_lens,
            avgdl,
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Non-negative IDF: ln(1 + (N - n + 0.5) / (n + 0.5))
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.postings.get(term).map_or(0, Vec::len) as f64;
        let total = self.docs.len() as f64;
        (1.0 + (total - n + 0.5) / (n + 0.5)).ln()
    }

    fn term_weight(&self, idf: f64, tf: u32, doc: usize) -> f64 {
        let Bm25Params { k1, b } = self.params;
        let tf = tf as f64;
        let len_norm = if self.avgdl > 0.0 {
            self.doc_lens[doc] as f64 / self.avgdl
        } else {
            1.0
        };
        idf * tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * len_norm))
    }

    /// BM25 score of one document; 0.0 for an out-of-range index
    pub fn score(&self, doc: usize, query_terms: &[String]) -> f64 {
        if doc >= self.docs.len() {
            return 0.0;
        }
        query_terms
            .iter()
            .filter_map(|term| {
                let postings = self.postings.get(term)?;
                let pos = postings.binary_search_by_key(&(doc as u32), |&(d, _)| d).ok()?;
                Some(self.term_weight(self.idf(term), postings[pos].1, doc))
            })
            .sum()
    }

    /// Top-k documents by score
    ///
    /// The filter is applied while scanning so rejected documents never
    /// consume a slot. Scores <= 0 are dropped; ties keep corpus order.
    pub fn search(
        &self,
        query_terms: &[String],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<ScoredNode> {
        if query_terms.is_empty() || top_k == 0 || self.docs.is_empty() {
            return Vec::new();
        }

        let mut scores = vec![0.0f64; self.docs.len()];
        for term in query_terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(term);
            for &(doc, tf) in postings {
                scores[doc as usize] += self.term_weight(idf, tf, doc as usize);
            }
        }

        let mut hits: Vec<(usize, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|&(_, score)| score > 0.0 && score.is_finite())
            .filter(|&(idx, _)| filter.map_or(true, |f| f.matches(&self.docs[idx].metadata)))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(top_k);

        let mut results: Vec<ScoredNode> = hits
            .into_iter()
            .map(|(idx, score)| ScoredNode::new(self.docs[idx].clone(), score))
            .collect();
        sort_and_rank(&mut results);
        results
    }
}

/// BM25 retriever over a swappable index snapshot
pub struct Bm25Retriever {
    index: RwLock<Arc<Bm25Index>>,
    tokenizer: Arc<dyn Tokenizer>,
    params: Bm25Params,
    blocking_threshold: usize,
    store: Option<Arc<NodeStore>>,
}

impl Bm25Retriever {
    /// Build synchronously; suitable for small corpora and tests
    pub fn new(
        docs: Vec<Arc<Node>>,
        tokenizer: Arc<dyn Tokenizer>,
        params: Bm25Params,
        blocking_threshold: usize,
    ) -> Self {
        let index = Bm25Index::build(docs, tokenizer.as_ref(), params);
        Self {
            index: RwLock::new(Arc::new(index)),
            tokenizer,
            params,
            blocking_threshold,
            store: None,
        }
    }

    /// Serve hits from `store` instead of the indexed copies
    pub fn with_store(mut self, store: Arc<NodeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build from configuration on the blocking pool
    pub async fn from_config(docs: Vec<Arc<Node>>, config: &Bm25Config) -> Result<Self> {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(UnicodeTokenizer::new(config.stopwords.clone()));
        let params = Bm25Params::from(config);
        let index = build_blocking(docs, tokenizer.clone(), params).await?;
        Ok(Self {
            index: RwLock::new(Arc::new(index)),
            tokenizer,
            params,
            blocking_threshold: config.blocking_threshold,
            store: None,
        })
    }

    /// Replace the snapshot with one built from `docs`
    pub async fn rebuild(&self, docs: Vec<Arc<Node>>) -> Result<()> {
        let index = build_blocking(docs, self.tokenizer.clone(), self.params).await?;
        let len = index.len();
        *self.index.write().await = Arc::new(index);
        info!(documents = len, "BM25 index swapped");
        Ok(())
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<Bm25Index> {
        self.index.read().await.clone()
    }

    fn resolve(&self, hits: &mut [ScoredNode]) {
        let Some(store) = &self.store else {
            return;
        };
        for hit in hits {
            if let Some(live) = store.get(hit.id()) {
                hit.node = live;
            }
        }
    }
}

async fn build_blocking(
    docs: Vec<Arc<Node>>,
    tokenizer: Arc<dyn Tokenizer>,
    params: Bm25Params,
) -> Result<Bm25Index> {
    let started = std::time::Instant::now();
    let index = tokio::task::spawn_blocking(move || Bm25Index::build(docs, tokenizer.as_ref(), params))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("BM25 index build panicked: {}", e),
        })?;
    info!(
        documents = index.len(),
        terms = index.postings.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "BM25 index built"
    );
    Ok(index)
}

#[async_trait::async_trait]
impl Retriever for Bm25Retriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ScoredNode>> {
        let terms = self.tokenizer.tokenize(&request.query);
        if terms.is_empty() {
            debug!(query = %request.query, "Query has no indexable terms");
            return Ok(Vec::new());
        }

        let index = self.snapshot().await;
        let mut hits = if index.len() <= self.blocking_threshold {
            index.search(&terms, request.top_k, request.filter.as_ref())
        } else {
            let top_k = request.top_k;
            let filter = request.filter.clone();
            tokio::task::spawn_blocking(move || index.search(&terms, top_k, filter.as_ref()))
                .await
                .map_err(|e| AppError::retrieval("sparse", e))?
        };
        self.resolve(&mut hits);
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "sparse"
    }
}
