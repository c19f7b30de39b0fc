//! Run outcomes, statistics, and duplicate cluster reports.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::document::Document;
use crate::types::record::ClassificationRecord;

/// Result of one classification run.
#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    /// One record per input document, in input order. Shorter only when
    /// the run was stopped early.
    pub records: Vec<ClassificationRecord>,

    /// Run statistics.
    pub stats: ClassifyStats,
}

/// Statistics for one classification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifyStats {
    /// Input document count.
    pub total: usize,

    /// Records parsed successfully.
    pub succeeded: usize,

    /// Records degraded to `Failed` defaults.
    pub failed: usize,

    /// Batches lost to recoverable gateway errors.
    pub gateway_errors: usize,

    /// Records recovered through a non-strict parser stage.
    pub parse_fallbacks: usize,

    /// Batch responses whose array length disagreed with the batch size.
    /// A data-quality signal: the positional-correspondence assumption
    /// behind count reconciliation is not guaranteed by the gateway.
    pub count_mismatches: usize,

    /// Whether the run ended at a cancellation checkpoint.
    pub stopped_by_user: bool,

    /// Wall-clock run time.
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,

    /// Per-field value counts over string-valued classification fields
    /// (the rubric's category counts, generalized).
    pub field_histograms: HashMap<String, HashMap<String, usize>>,
}

impl ClassifyStats {
    /// Tally a record's string fields into the histograms.
    pub(crate) fn tally_fields(&mut self, record: &ClassificationRecord) {
        for (key, value) in &record.fields {
            if let Some(s) = value.as_str() {
                *self
                    .field_histograms
                    .entry(key.clone())
                    .or_default()
                    .entry(s.to_string())
                    .or_default() += 1;
            }
        }
    }
}

/// Result of one deduplication run.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    /// Surviving documents in original input order: every singleton plus
    /// one representative per cluster.
    pub kept: Vec<Document>,

    /// Multi-member duplicate clusters.
    pub clusters: Vec<DuplicateCluster>,

    /// Run statistics.
    pub stats: DedupStats,
}

/// A group of near-duplicate documents.
///
/// Invariant: at least two members; singletons are never wrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Document ids in original input order.
    pub members: Vec<String>,

    /// The retained member, nearest to the cluster centroid.
    pub representative: String,

    /// Cosine similarity of each member to the representative, aligned
    /// with `members`.
    pub similarities: Vec<f64>,
}

impl DuplicateCluster {
    /// Ids of members that were removed in favor of the representative,
    /// paired with their similarity to it.
    pub fn removed(&self) -> impl Iterator<Item = (&str, f64)> {
        self.members
            .iter()
            .zip(self.similarities.iter())
            .filter(|(id, _)| id.as_str() != self.representative)
            .map(|(id, sim)| (id.as_str(), *sim))
    }
}

/// Statistics for one deduplication run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupStats {
    /// Input document count.
    pub original_count: usize,

    /// Documents surviving deduplication.
    pub kept_count: usize,

    /// Documents removed as duplicates.
    pub removed_count: usize,

    /// Removed share of the input, one decimal place.
    pub reduction_percentage: f64,

    /// Number of multi-member clusters found.
    pub cluster_count: usize,

    /// Wall-clock run time.
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

/// Serialize `Duration` as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
