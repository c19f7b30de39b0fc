//! Embedding-based near-duplicate removal.
//!
//! Embeds every document (title emphasized), clusters the vectors with
//! DBSCAN over cosine distance, and keeps one representative per cluster:
//! the member nearest the cluster centroid, first-in-input on ties. All
//! other cluster members are reported as removed with their similarity to
//! the representative.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info};

use crate::error::{GatewayError, Result, TriageError};
use crate::pipeline::cluster::{centroid, cosine_similarity, dbscan};
use crate::pipeline::prompts::truncate_chars;
use crate::progress::{ProgressChannel, ProgressEvent};
use crate::traits::embedding::EmbeddingGateway;
use crate::types::config::DedupConfig;
use crate::types::document::Document;
use crate::types::report::{DedupOutcome, DedupStats, DuplicateCluster};

/// Deduplication engine over an embedding gateway.
pub struct DedupEngine<E: EmbeddingGateway> {
    gateway: E,
    config: DedupConfig,
}

impl<E: EmbeddingGateway> DedupEngine<E> {
    /// Create an engine with default configuration.
    pub fn new(gateway: E) -> Self {
        Self {
            gateway,
            config: DedupConfig::default(),
        }
    }

    /// Create an engine with custom configuration.
    pub fn with_config(gateway: E, config: DedupConfig) -> Self {
        Self { gateway, config }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Deduplicate a document list.
    ///
    /// Embedding failures are fatal for the run: without a complete vector
    /// set the clustering result would be meaningless.
    pub async fn deduplicate(&self, documents: &[Document]) -> Result<DedupOutcome> {
        self.run(documents, None).await
    }

    /// As [`deduplicate`](Self::deduplicate), publishing stage progress to
    /// a channel session.
    pub async fn deduplicate_with_progress(
        &self,
        documents: &[Document],
        session_id: &str,
        channel: &ProgressChannel,
    ) -> Result<DedupOutcome> {
        self.run(documents, Some((session_id, channel))).await
    }

    async fn run(
        &self,
        documents: &[Document],
        progress: Option<(&str, &ProgressChannel)>,
    ) -> Result<DedupOutcome> {
        if documents.is_empty() {
            return Err(TriageError::validation("no documents to deduplicate"));
        }

        let started = Instant::now();
        let total = documents.len();
        info!(
            total,
            threshold = self.config.similarity_threshold,
            "deduplication started"
        );

        self.publish(progress, ProgressEvent::progress(0, total as u64, "preparing texts"))
            .await;

        let texts: Vec<String> = documents
            .iter()
            .map(|doc| self.embedding_text(doc))
            .collect();

        let embeddings = self.embed_all(&texts, total, progress).await?;

        self.publish(
            progress,
            ProgressEvent::progress(total as u64, total as u64, "clustering embeddings"),
        )
        .await;

        let labels = dbscan(&embeddings, self.config.eps(), self.config.min_cluster_size);

        // Group member indices per cluster; BTreeMap keeps cluster order
        // stable across runs.
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, label) in labels.iter().enumerate() {
            if let Some(cluster) = label {
                groups.entry(*cluster).or_default().push(idx);
            }
        }

        let mut clusters = Vec::new();
        let mut removed: HashSet<usize> = HashSet::new();

        for (cluster_id, members) in groups {
            if members.len() < 2 {
                continue;
            }

            let member_vectors: Vec<&[f32]> =
                members.iter().map(|&i| embeddings[i].as_slice()).collect();
            let center = centroid(&member_vectors);

            // Nearest to centroid wins; strict comparison keeps the lowest
            // original index on ties.
            let mut representative = members[0];
            let mut best = f64::NEG_INFINITY;
            for &idx in &members {
                let sim = cosine_similarity(&center, &embeddings[idx]);
                if sim > best {
                    best = sim;
                    representative = idx;
                }
            }

            let similarities: Vec<f64> = members
                .iter()
                .map(|&idx| cosine_similarity(&embeddings[representative], &embeddings[idx]))
                .collect();

            for &idx in &members {
                if idx != representative {
                    removed.insert(idx);
                }
            }

            debug!(
                cluster_id,
                size = members.len(),
                representative = %documents[representative].id,
                "duplicate cluster found"
            );

            clusters.push(DuplicateCluster {
                members: members.iter().map(|&i| documents[i].id.clone()).collect(),
                representative: documents[representative].id.clone(),
                similarities,
            });
        }

        let kept: Vec<Document> = documents
            .iter()
            .enumerate()
            .filter(|(idx, _)| !removed.contains(idx))
            .map(|(_, doc)| doc.clone())
            .collect();

        let stats = DedupStats {
            original_count: total,
            kept_count: kept.len(),
            removed_count: removed.len(),
            reduction_percentage: (removed.len() as f64 / total as f64 * 1000.0).round() / 10.0,
            cluster_count: clusters.len(),
            elapsed: started.elapsed(),
        };

        info!(
            original = stats.original_count,
            kept = stats.kept_count,
            removed = stats.removed_count,
            clusters = stats.cluster_count,
            "deduplication finished"
        );

        if let Some((session_id, channel)) = progress {
            let summary = serde_json::to_value(&stats).unwrap_or_default();
            channel
                .publish(session_id, ProgressEvent::completed(summary), true)
                .await;
        }

        Ok(DedupOutcome {
            kept,
            clusters,
            stats,
        })
    }

    /// Embed all texts in fixed-size batches, running waves of concurrent
    /// requests with a pacing delay between waves.
    async fn embed_all(
        &self,
        texts: &[String],
        total: usize,
        progress: Option<(&str, &ProgressChannel)>,
    ) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<&[String]> = texts.chunks(self.config.embed_batch_size).collect();
        let batch_count = batches.len();
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());

        for (wave_idx, wave) in batches.chunks(self.config.embed_concurrency).enumerate() {
            if wave_idx > 0 {
                tokio::time::sleep(self.config.embed_delay).await;
            }

            let results = join_all(wave.iter().map(|batch| self.gateway.embed(batch))).await;
            for (batch, result) in wave.iter().zip(results) {
                let vectors = result.map_err(TriageError::Gateway)?;
                if vectors.len() != batch.len() {
                    return Err(GatewayError::InvalidResponse(format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        vectors.len()
                    ))
                    .into());
                }
                embeddings.extend(vectors);
            }

            let done_batches = wave_idx * self.config.embed_concurrency + wave.len();
            debug!(done_batches, batch_count, "embedding wave finished");
            self.publish(
                progress,
                ProgressEvent::progress(
                    embeddings.len() as u64,
                    total as u64,
                    format!("embedding documents ({done_batches}/{batch_count} batches)"),
                ),
            )
            .await;
        }

        Ok(embeddings)
    }

    /// Build the embedding input for one document: title twice for
    /// emphasis, then the body, whitespace collapsed and capped.
    fn embedding_text(&self, doc: &Document) -> String {
        let combined = format!("{}. {}. {}", doc.title.trim(), doc.title.trim(), doc.body.trim());
        let collapsed = combined.split_whitespace().collect::<Vec<_>>().join(" ");
        truncate_chars(&collapsed, self.config.max_text_len)
    }

    async fn publish(&self, progress: Option<(&str, &ProgressChannel)>, event: ProgressEvent) {
        if let Some((session_id, channel)) = progress {
            channel.publish(session_id, event, true).await;
        }
    }
}
