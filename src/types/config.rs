//! Pipeline configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use indexmap::IndexMap;

/// How documents are grouped for AI gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifyMode {
    /// One gateway call per batch of documents.
    #[default]
    Batched,

    /// One gateway call per document.
    PerItem,
}

/// Configuration for the batch classification orchestrator.
#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    /// Documents per gateway call in batched mode.
    pub batch_size: usize,

    /// Batched vs per-item invocation.
    pub mode: ClassifyMode,

    /// Output token ceiling per document; the per-call ceiling is this
    /// value scaled by the batch length.
    pub max_output_per_item: u32,

    /// Flat pacing delay between batches (upstream rate-limit courtesy,
    /// not a retry mechanism).
    pub batch_delay: Duration,

    /// Normalization rules applied to every parsed record.
    pub normalizer: NormalizerConfig,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            mode: ClassifyMode::Batched,
            max_output_per_item: 500,
            batch_delay: Duration::from_millis(100),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl ClassifyConfig {
    /// Set the batch size (clamped to at least 1).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the invocation mode.
    pub fn with_mode(mut self, mode: ClassifyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the inter-batch pacing delay.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Set the normalizer rules.
    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Effective documents-per-call for the configured mode.
    pub fn effective_batch_size(&self) -> usize {
        match self.mode {
            ClassifyMode::Batched => self.batch_size.max(1),
            ClassifyMode::PerItem => 1,
        }
    }
}

/// Caller-defined normalization rules for parsed records.
///
/// The rubric decides which fields exist, so the normalizer is data, not
/// code: key aliases fold typos and spelling variants onto canonical names,
/// numeric ranges clamp values, list caps bound cardinality, and defaults
/// fill required keys instead of erroring.
#[derive(Debug, Clone, Default)]
pub struct NormalizerConfig {
    /// Case-folded key -> canonical key (typo/synonym table).
    pub key_aliases: HashMap<String, String>,

    /// Canonical value alias table, applied to string fields
    /// (e.g. legacy category spellings onto current ones).
    pub value_aliases: HashMap<String, HashMap<String, String>>,

    /// Field -> (min, max) clamp for numeric values. `confidence` is
    /// always clamped into [0, 1] even when absent here.
    pub numeric_ranges: HashMap<String, (f64, f64)>,

    /// Field -> maximum list cardinality.
    pub list_caps: HashMap<String, usize>,

    /// Required keys and the defaults used when the model omits them.
    /// Also the full field set of a `Failed` record.
    pub defaults: IndexMap<String, Value>,

    /// Fallback confidence when the model emits a non-numeric or
    /// non-finite value.
    pub default_confidence: f64,
}

impl NormalizerConfig {
    /// Create an empty rule set with the conventional 0.5 confidence
    /// fallback.
    pub fn new() -> Self {
        Self {
            default_confidence: 0.5,
            ..Default::default()
        }
    }

    /// Map a key spelling onto a canonical name. The alias is matched
    /// case-folded.
    pub fn with_key_alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.key_aliases
            .insert(alias.into().to_lowercase(), canonical.into());
        self
    }

    /// Map a value spelling onto a canonical value for one field.
    pub fn with_value_alias(
        mut self,
        field: impl Into<String>,
        alias: impl Into<String>,
        canonical: impl Into<String>,
    ) -> Self {
        self.value_aliases
            .entry(field.into())
            .or_default()
            .insert(alias.into(), canonical.into());
        self
    }

    /// Clamp a numeric field into a range.
    pub fn with_numeric_range(mut self, field: impl Into<String>, min: f64, max: f64) -> Self {
        self.numeric_ranges.insert(field.into(), (min, max));
        self
    }

    /// Cap a list field's cardinality.
    pub fn with_list_cap(mut self, field: impl Into<String>, cap: usize) -> Self {
        self.list_caps.insert(field.into(), cap);
        self
    }

    /// Declare a required key with its default value.
    pub fn with_default(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(field.into(), value.into());
        self
    }
}

/// Configuration for the deduplication engine.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Cosine similarity at or above which two documents are duplicates.
    /// Clustering radius is `1 - similarity_threshold`.
    pub similarity_threshold: f64,

    /// Texts per embedding gateway call.
    pub embed_batch_size: usize,

    /// Concurrent embedding requests per wave.
    pub embed_concurrency: usize,

    /// Pacing delay between embedding waves.
    pub embed_delay: Duration,

    /// Minimum members for a duplicate cluster.
    pub min_cluster_size: usize,

    /// Character ceiling for embedding input text.
    pub max_text_len: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            embed_batch_size: 50,
            embed_concurrency: 4,
            embed_delay: Duration::from_millis(100),
            min_cluster_size: 2,
            max_text_len: 1500,
        }
    }
}

impl DedupConfig {
    /// Set the similarity threshold (clamped into [0, 1]).
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the embedding batch size (clamped to at least 1).
    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    /// Set the per-wave concurrency (clamped to at least 1).
    pub fn with_embed_concurrency(mut self, concurrency: usize) -> Self {
        self.embed_concurrency = concurrency.max(1);
        self
    }

    /// Set the minimum cluster size (clamped to at least 2; singletons
    /// are never wrapped in a cluster).
    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size.max(2);
        self
    }

    /// Neighborhood radius for the clustering pass.
    pub fn eps(&self) -> f64 {
        1.0 - self.similarity_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_defaults() {
        let config = ClassifyConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.mode, ClassifyMode::Batched);
        assert_eq!(config.effective_batch_size(), 10);
    }

    #[test]
    fn test_per_item_mode_batch_size() {
        let config = ClassifyConfig::default()
            .with_batch_size(25)
            .with_mode(ClassifyMode::PerItem);
        assert_eq!(config.effective_batch_size(), 1);
    }

    #[test]
    fn test_dedup_eps() {
        let config = DedupConfig::default().with_similarity_threshold(0.9);
        assert!((config.eps() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_min_cluster_size_floor() {
        let config = DedupConfig::default().with_min_cluster_size(0);
        assert_eq!(config.min_cluster_size, 2);
    }
}
