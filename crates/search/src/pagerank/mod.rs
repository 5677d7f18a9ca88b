//! Link authority
//!
//! PageRank over the hyperlink graph, computed offline and joined into node
//! metadata by url.

mod graph;
mod job;
mod pagerank;

pub use graph::LinkGraph;
pub use job::{AuthorityJob, JobReport};
pub use pagerank::{PageRank, PageRankResult};
