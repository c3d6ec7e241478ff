pub mod bm25;
pub mod coordinator;

pub use bm25::{Bm25Hit, Bm25Index, BM25_B, BM25_K1};
pub use coordinator::IndexCoordinator;
