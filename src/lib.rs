//! News Triage Library
//!
//! Batch classification and near-duplicate removal for news documents,
//! driven by caller-supplied rubrics rather than a fixed schema.
//!
//! # Design Philosophy
//!
//! **"The rubric owns the schema"**
//!
//! - Rubric-driven, not schema-driven: records are open key/value maps
//! - Tolerant parsing: malformed model output degrades, it never aborts
//! - One record per document, always, in input order
//! - Cooperative cancellation at batch boundaries only
//! - Library handles mechanics, app handles semantics
//!
//! # Usage
//!
//! ```rust,ignore
//! use news_triage::{Classifier, DedupEngine, ProgressChannel};
//! use news_triage::ai::OpenAiGateway;
//!
//! let gateway = OpenAiGateway::from_env()?;
//! let channel = ProgressChannel::new();
//!
//! // Drop near-duplicates first, then classify the survivors.
//! let deduped = DedupEngine::new(gateway.clone()).deduplicate(&documents).await?;
//!
//! let cancel = channel.open_session("run-1", deduped.kept.len() as u64).await?;
//! let outcome = Classifier::new(gateway)
//!     .run(&deduped.kept, rubric, "run-1", &cancel, &channel)
//!     .await?;
//! channel.close_session("run-1").await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (AiGateway, EmbeddingGateway, ProgressSubscriber)
//! - [`types`] - Documents, records, configuration, and run reports
//! - [`pipeline`] - Classification and deduplication orchestration
//! - [`progress`] - Session-scoped progress broadcasting and cancellation
//! - [`ai`] - OpenAI-backed gateway implementation
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{GatewayError, TriageError};
pub use traits::{AiGateway, DeliveryError, EmbeddingGateway, ProgressSubscriber};
pub use types::{
    ClassificationRecord, ClassifyConfig, ClassifyMode, ClassifyOutcome, ClassifyStats,
    DedupConfig, DedupOutcome, DedupStats, Document, DuplicateCluster, NormalizerConfig,
    RecordStatus,
};

// Re-export the pipeline entry points
pub use pipeline::{Classifier, DedupEngine};

// Re-export the progress surface
pub use progress::{CancelHandle, ProgressChannel, ProgressEvent};
