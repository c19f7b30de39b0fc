//! Domain data types for the triage pipelines.

pub mod config;
pub mod document;
pub mod record;
pub mod report;

pub use config::{ClassifyConfig, ClassifyMode, DedupConfig, NormalizerConfig};
pub use document::Document;
pub use record::{ClassificationRecord, RecordStatus};
pub use report::{ClassifyOutcome, ClassifyStats, DedupOutcome, DedupStats, DuplicateCluster};
