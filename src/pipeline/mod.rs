//! Classification and deduplication pipelines.
//!
//! The pipeline orchestrates:
//! - Batch classification against a caller rubric (one AI call per batch)
//! - Tolerant parsing and normalization of model replies
//! - Embedding-based near-duplicate clustering and representative selection
//! - Per-batch progress reporting and cooperative cancellation

pub mod classify;
pub mod cluster;
pub mod dedup;
pub mod parse;
pub mod prompts;

pub use classify::Classifier;
pub use cluster::{centroid, cosine_distance, cosine_similarity, dbscan};
pub use dedup::DedupEngine;
pub use parse::{parse_many, parse_one, parse_one_reported, ParseReport};
pub use prompts::{render_batch_prompt, render_item_prompt};
