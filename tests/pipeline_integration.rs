//! Integration tests for the triage pipelines.
//!
//! These tests verify the full workflow:
//! 1. Deduplicate a document set
//! 2. Classify the survivors in batches
//! 3. Observe progress and cancellation through the channel

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use news_triage::{
    error::GatewayResult,
    testing::{CollectingSubscriber, MockAiGateway, MockEmbeddingGateway, ScriptedResponse},
    AiGateway, CancelHandle, Classifier, ClassifyConfig, DedupConfig, DedupEngine, Document,
    NormalizerConfig, ProgressChannel, ProgressEvent, RecordStatus, TriageError,
};

/// Helper to create a test document.
fn doc(i: usize) -> Document {
    Document::new(
        format!("doc-{i}"),
        format!("Headline number {i}"),
        format!("Body text for article {i}"),
    )
}

fn docs(n: usize) -> Vec<Document> {
    (0..n).map(doc).collect()
}

fn fast_config(batch_size: usize) -> ClassifyConfig {
    ClassifyConfig::default()
        .with_batch_size(batch_size)
        .with_batch_delay(std::time::Duration::ZERO)
        .with_normalizer(
            NormalizerConfig::new()
                .with_default("category", "other")
                .with_list_cap("keywords", 3),
        )
}

fn batch_json(categories: &[&str]) -> String {
    let objects: Vec<String> = categories
        .iter()
        .map(|c| format!(r#"{{"category":"{c}","confidence":0.9,"keywords":["k"]}}"#))
        .collect();
    format!("[{}]", objects.join(","))
}

#[tokio::test]
async fn test_full_run_yields_one_record_per_document() {
    let gateway = MockAiGateway::new()
        .with_response(ScriptedResponse::Text(batch_json(&["politics", "economy"])))
        .with_response(ScriptedResponse::Text(batch_json(&["sports", "politics"])))
        .with_response(ScriptedResponse::Text(batch_json(&["economy"])));
    let classifier = Classifier::with_config(gateway, fast_config(2));

    let channel = ProgressChannel::new();
    let cancel = channel.open_session("run-1", 5).await.unwrap();
    let subscriber = CollectingSubscriber::new();
    let events = subscriber.events();
    channel.subscribe("run-1", Box::new(subscriber)).await;

    let documents = docs(5);
    let outcome = classifier
        .run(&documents, "Classify each article.", "run-1", &cancel, &channel)
        .await
        .unwrap();
    channel.close_session("run-1").await;

    assert_eq!(outcome.records.len(), 5);
    assert_eq!(outcome.stats.total, 5);
    assert_eq!(outcome.stats.succeeded, 5);
    assert!(!outcome.stats.stopped_by_user);

    // Every record kept its source document's identity, in input order.
    for (record, document) in outcome.records.iter().zip(&documents) {
        assert_eq!(record.get("id").unwrap(), document.id.as_str());
        assert_eq!(record.status, RecordStatus::Ok);
    }

    // Started, then progress, then completed; percentages never regress.
    let seen = events.lock().unwrap();
    assert!(matches!(seen.first(), Some(ProgressEvent::Started { .. })));
    assert!(matches!(seen.last(), Some(ProgressEvent::Completed { .. })));
    let percentages: Vec<f64> = seen
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { percentage, .. } => Some(*percentage),
            _ => None,
        })
        .collect();
    assert!(!percentages.is_empty());
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*percentages.last().unwrap(), 100.0);
}

/// Gateway that requests a stop through its handle after a fixed number of
/// completed calls, then keeps answering normally.
struct CancellingGateway {
    calls: AtomicUsize,
    cancel_after: usize,
    handle: CancelHandle,
}

#[async_trait]
impl AiGateway for CancellingGateway {
    async fn complete(&self, _prompt: &str, _max_output_tokens: u32) -> GatewayResult<String> {
        let done = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if done >= self.cancel_after {
            self.handle.cancel();
        }
        Ok(batch_json(&["politics", "economy"]))
    }
}

#[tokio::test]
async fn test_stop_request_takes_effect_at_batch_boundary() {
    let channel = ProgressChannel::new();
    let cancel = channel.open_session("run-2", 10).await.unwrap();
    let subscriber = CollectingSubscriber::new();
    let events = subscriber.events();
    channel.subscribe("run-2", Box::new(subscriber)).await;

    let gateway = CancellingGateway {
        calls: AtomicUsize::new(0),
        cancel_after: 2,
        handle: cancel.clone(),
    };
    let classifier = Classifier::with_config(gateway, fast_config(2));

    let outcome = classifier
        .run(&docs(10), "Classify each article.", "run-2", &cancel, &channel)
        .await
        .unwrap();
    channel.close_session("run-2").await;

    // Batch 2 was in flight when the stop arrived, so it completed; the
    // run ended at the next boundary with 4 of 10 records.
    assert_eq!(outcome.records.len(), 4);
    assert!(outcome.stats.stopped_by_user);

    let seen = events.lock().unwrap();
    assert!(matches!(
        seen.last(),
        Some(ProgressEvent::Stopped { current: 4, total: 10, .. })
    ));
    assert!(!seen.iter().any(|e| matches!(e, ProgressEvent::Completed { .. })));
}

#[tokio::test]
async fn test_auth_failure_aborts_and_reports_error() {
    let gateway = MockAiGateway::new()
        .with_response(ScriptedResponse::Text(batch_json(&["politics", "economy"])))
        .with_response(ScriptedResponse::AuthFailure);
    let classifier = Classifier::with_config(gateway, fast_config(2));

    let channel = ProgressChannel::new();
    let cancel = channel.open_session("run-3", 6).await.unwrap();
    let subscriber = CollectingSubscriber::new();
    let events = subscriber.events();
    channel.subscribe("run-3", Box::new(subscriber)).await;

    let err = classifier
        .run(&docs(6), "Classify each article.", "run-3", &cancel, &channel)
        .await
        .unwrap_err();
    channel.close_session("run-3").await;

    assert!(matches!(err, TriageError::Gateway(_)));
    let seen = events.lock().unwrap();
    assert!(seen.iter().any(|e| matches!(e, ProgressEvent::Error { .. })));
}

#[tokio::test]
async fn test_transient_failures_degrade_without_aborting() {
    let gateway = MockAiGateway::new()
        .with_response(ScriptedResponse::RateLimited)
        .with_response(ScriptedResponse::Text(batch_json(&["sports", "economy"])))
        .with_response(ScriptedResponse::Transient("connection reset".into()));
    let classifier = Classifier::with_config(gateway, fast_config(2));

    let outcome = classifier
        .run(
            &docs(6),
            "Classify each article.",
            "run-4",
            &CancelHandle::new(),
            &ProgressChannel::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 6);
    assert_eq!(outcome.stats.gateway_errors, 2);
    assert_eq!(outcome.stats.failed, 4);
    assert_eq!(outcome.stats.succeeded, 2);
    // Degraded records still carry their documents and the default fields.
    assert_eq!(outcome.records[0].get("category").unwrap(), "other");
    assert_eq!(outcome.records[0].get("id").unwrap(), "doc-0");
}

#[tokio::test]
async fn test_dedup_then_classify_flow() {
    // doc-0/doc-1/doc-2 are near-identical, doc-3 and doc-4 stand alone.
    let embeddings = MockEmbeddingGateway::with_vectors(vec![
        vec![1.0, 0.0, 0.0],
        vec![0.99, 0.05, 0.0],
        vec![0.98, 0.0, 0.08],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ]);
    let engine = DedupEngine::with_config(
        embeddings,
        DedupConfig::default().with_similarity_threshold(0.85),
    );

    let channel = ProgressChannel::new();
    channel.open_session("run-5", 5).await.unwrap();
    let subscriber = CollectingSubscriber::new();
    let events = subscriber.events();
    channel.subscribe("run-5", Box::new(subscriber)).await;

    let deduped = engine
        .deduplicate_with_progress(&docs(5), "run-5", &channel)
        .await
        .unwrap();
    channel.close_session("run-5").await;

    assert_eq!(deduped.stats.original_count, 5);
    assert_eq!(deduped.kept.len(), 3);
    assert_eq!(deduped.clusters.len(), 1);
    assert_eq!(deduped.clusters[0].members.len(), 3);
    // The cluster representative survives into the kept set.
    assert!(deduped
        .kept
        .iter()
        .any(|d| d.id == deduped.clusters[0].representative));

    let seen = events.lock().unwrap();
    assert!(matches!(seen.last(), Some(ProgressEvent::Completed { .. })));
    drop(seen);

    // Survivors feed straight into classification.
    let gateway = MockAiGateway::new().with_response(ScriptedResponse::Text(batch_json(&[
        "politics", "economy", "sports",
    ])));
    let classifier = Classifier::with_config(gateway, fast_config(10));
    let outcome = classifier
        .run(
            &deduped.kept,
            "Classify each article.",
            "run-6",
            &CancelHandle::new(),
            &ProgressChannel::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.stats.succeeded, 3);
}

#[tokio::test]
async fn test_count_mismatch_is_padded_and_counted() {
    // The model answers with 2 objects for a 4-document batch.
    let gateway = MockAiGateway::new()
        .with_response(ScriptedResponse::Text(batch_json(&["politics", "economy"])));
    let classifier = Classifier::with_config(gateway, fast_config(4));

    let outcome = classifier
        .run(
            &docs(4),
            "Classify each article.",
            "run-7",
            &CancelHandle::new(),
            &ProgressChannel::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(outcome.stats.count_mismatches, 1);
    assert_eq!(outcome.stats.succeeded, 2);
    assert_eq!(outcome.stats.failed, 2);
    assert_eq!(outcome.records[3].status, RecordStatus::Failed);
}
