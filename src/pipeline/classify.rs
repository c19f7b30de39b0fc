//! Batch classification orchestrator.
//!
//! Drives the classify-all-documents workflow: partitions the input into
//! batches, makes one AI gateway call per batch, feeds responses through the
//! tolerant parser, merges records onto their source documents, and reports
//! progress after every batch.
//!
//! Batches run strictly sequentially. Progress accounting and cancellation
//! both depend on that total ordering, so batches are never parallelized.
//! Cancellation is polled only at batch boundaries; an in-flight gateway
//! call always completes first.
//!
//! A single batch failure never aborts the run: recoverable gateway errors
//! and total parse failures degrade the affected batch to `Failed` default
//! records and the loop continues. Only precondition violations and auth
//! failures surface as errors.

use std::time::Instant;

use tracing::{error, info, warn};

use crate::error::{Result, TriageError};
use crate::pipeline::parse::parse_many;
use crate::pipeline::prompts::{render_batch_prompt, render_item_prompt};
use crate::progress::{CancelHandle, ProgressChannel, ProgressEvent};
use crate::traits::ai::AiGateway;
use crate::types::config::{ClassifyConfig, ClassifyMode};
use crate::types::document::Document;
use crate::types::record::{ClassificationRecord, RecordStatus};
use crate::types::report::{ClassifyOutcome, ClassifyStats};

/// Batch classification orchestrator over an AI gateway.
pub struct Classifier<A: AiGateway> {
    gateway: A,
    config: ClassifyConfig,
}

impl<A: AiGateway> Classifier<A> {
    /// Create a classifier with default configuration.
    pub fn new(gateway: A) -> Self {
        Self {
            gateway,
            config: ClassifyConfig::default(),
        }
    }

    /// Create a classifier with custom configuration.
    pub fn with_config(gateway: A, config: ClassifyConfig) -> Self {
        Self { gateway, config }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &ClassifyConfig {
        &self.config
    }

    /// Classify every document against the rubric.
    ///
    /// Returns one record per document in input order, or a front prefix of
    /// them when the run is stopped through `cancel`. Progress events are
    /// published to `channel` under `session_id`; publishing to a session
    /// nobody opened is a no-op, so a caller that wants no reporting can
    /// pass a fresh channel and a standalone [`CancelHandle`].
    pub async fn run(
        &self,
        documents: &[Document],
        rubric: &str,
        session_id: &str,
        cancel: &CancelHandle,
        channel: &ProgressChannel,
    ) -> Result<ClassifyOutcome> {
        if rubric.trim().is_empty() {
            return Err(TriageError::validation("rubric must not be empty"));
        }
        if documents.is_empty() {
            return Err(TriageError::validation("no documents to classify"));
        }

        let started = Instant::now();
        let total = documents.len();
        let batch_size = self.config.effective_batch_size();
        let batches: Vec<&[Document]> = documents.chunks(batch_size).collect();

        info!(
            session_id,
            total,
            batch_size,
            mode = ?self.config.mode,
            "classification started"
        );
        channel
            .publish(
                session_id,
                ProgressEvent::started(total as u64, "classification started"),
                true,
            )
            .await;

        let mut records: Vec<ClassificationRecord> = Vec::with_capacity(total);
        let mut stats = ClassifyStats {
            total,
            ..Default::default()
        };

        let batch_count = batches.len();
        for (batch_idx, batch) in batches.into_iter().enumerate() {
            // The only cancellation checkpoint.
            if cancel.is_cancelled() {
                info!(session_id, done = records.len(), "stopped by user");
                stats.stopped_by_user = true;
                channel
                    .publish(
                        session_id,
                        ProgressEvent::stopped(records.len() as u64, total as u64),
                        true,
                    )
                    .await;
                break;
            }

            if let Err(err) = self
                .classify_batch(batch, rubric, &mut records, &mut stats)
                .await
            {
                channel
                    .publish(session_id, ProgressEvent::error(err.to_string()), true)
                    .await;
                return Err(err);
            }

            channel
                .publish(
                    session_id,
                    ProgressEvent::progress(
                        records.len() as u64,
                        total as u64,
                        format!("classified {}/{} documents", records.len(), total),
                    ),
                    true,
                )
                .await;

            if batch_idx + 1 < batch_count {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        stats.elapsed = started.elapsed();
        info!(
            session_id,
            succeeded = stats.succeeded,
            failed = stats.failed,
            gateway_errors = stats.gateway_errors,
            stopped = stats.stopped_by_user,
            "classification finished"
        );

        if !stats.stopped_by_user {
            let summary = serde_json::to_value(&stats).unwrap_or_default();
            channel
                .publish(session_id, ProgressEvent::completed(summary), true)
                .await;
        }

        Ok(ClassifyOutcome { records, stats })
    }

    /// Classify one batch, absorbing recoverable failures into `Failed`
    /// records. Only auth errors propagate.
    async fn classify_batch(
        &self,
        batch: &[Document],
        rubric: &str,
        records: &mut Vec<ClassificationRecord>,
        stats: &mut ClassifyStats,
    ) -> Result<()> {
        // Per-item mode skips the gateway for blank documents, matching
        // the single-document granularity of that mode.
        if self.config.mode == ClassifyMode::PerItem && batch[0].is_empty() {
            warn!(id = %batch[0].id, "document has no text, skipping gateway call");
            self.push_failed_batch(batch, records, stats);
            return Ok(());
        }

        let prompt = match self.config.mode {
            ClassifyMode::Batched => render_batch_prompt(rubric, batch),
            ClassifyMode::PerItem => render_item_prompt(rubric, &batch[0]),
        };
        let max_output = self
            .config
            .max_output_per_item
            .saturating_mul(batch.len() as u32);

        let response = match self.gateway.complete(&prompt, max_output).await {
            Ok(text) => text,
            Err(err) if err.is_fatal() => {
                error!(error = %err, "fatal gateway error, aborting run");
                return Err(err.into());
            }
            Err(err) => {
                warn!(error = %err, size = batch.len(), "batch degraded to failed defaults");
                stats.gateway_errors += 1;
                self.push_failed_batch(batch, records, stats);
                return Ok(());
            }
        };

        let (parsed, report) = parse_many(&response, batch.len(), &self.config.normalizer);
        stats.parse_fallbacks += report.fallbacks;
        if report.count_mismatch() {
            stats.count_mismatches += 1;
        }

        for (doc, mut record) in batch.iter().zip(parsed) {
            match record.status {
                RecordStatus::Ok => stats.succeeded += 1,
                RecordStatus::Failed => stats.failed += 1,
            }
            // Histograms cover classification fields only, so tally
            // before document fields are overlaid.
            stats.tally_fields(&record);
            record.overlay_document(doc);
            records.push(record);
        }
        Ok(())
    }

    fn push_failed_batch(
        &self,
        batch: &[Document],
        records: &mut Vec<ClassificationRecord>,
        stats: &mut ClassifyStats,
    ) {
        for doc in batch {
            let mut record = ClassificationRecord::failed(&self.config.normalizer.defaults);
            stats.failed += 1;
            stats.tally_fields(&record);
            record.overlay_document(doc);
            records.push(record);
        }
    }
}
