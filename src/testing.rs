//! Test doubles for the gateway and subscriber seams.
//!
//! The mocks are scripted: calls consume queued responses in order and every
//! call is recorded, so tests can assert both what was returned and what the
//! pipeline actually asked for. When a script runs dry the mocks fall back
//! to cheap deterministic behavior instead of panicking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{GatewayError, GatewayResult};
use crate::progress::ProgressEvent;
use crate::traits::ai::AiGateway;
use crate::traits::embedding::EmbeddingGateway;
use crate::traits::subscriber::{DeliveryError, ProgressSubscriber};

/// One scripted reply for [`MockAiGateway`].
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Return this completion text.
    Text(String),
    /// Fail with a rate-limit error (recoverable).
    RateLimited,
    /// Fail with an auth error (fatal).
    AuthFailure,
    /// Fail with a transient error carrying this message (recoverable).
    Transient(String),
}

/// Scripted AI gateway recording every prompt it receives.
#[derive(Default)]
pub struct MockAiGateway {
    script: Mutex<Vec<ScriptedResponse>>,
    prompts: Mutex<Vec<String>>,
}

impl MockAiGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one scripted response. Responses are consumed in queue order;
    /// once the script is exhausted every call returns `"[]"`.
    pub fn with_response(self, response: ScriptedResponse) -> Self {
        self.script.lock().unwrap().push(response);
        self
    }

    /// Number of completion calls made so far.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// The prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiGateway for MockAiGateway {
    async fn complete(&self, prompt: &str, _max_output_tokens: u32) -> GatewayResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                None
            } else {
                Some(script.remove(0))
            }
        };

        match next {
            Some(ScriptedResponse::Text(text)) => Ok(text),
            Some(ScriptedResponse::RateLimited) => Err(GatewayError::RateLimited),
            Some(ScriptedResponse::AuthFailure) => {
                Err(GatewayError::Auth("invalid api key".to_string()))
            }
            Some(ScriptedResponse::Transient(message)) => {
                Err(GatewayError::transient(message))
            }
            None => Ok("[]".to_string()),
        }
    }
}

/// Embedding gateway serving pre-seeded vectors, falling back to
/// deterministic hash-derived vectors when the seed runs out.
#[derive(Default)]
pub struct MockEmbeddingGateway {
    vectors: Mutex<Vec<Vec<f32>>>,
    calls: AtomicUsize,
}

impl MockEmbeddingGateway {
    /// A gateway producing only deterministic hash-derived vectors: equal
    /// texts embed identically, different texts almost surely do not.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one vector per expected input text, served in input order
    /// across however many batched calls the engine makes.
    pub fn with_vectors(vectors: Vec<Vec<f32>>) -> Self {
        Self {
            vectors: Mutex::new(vectors),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of embed calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hash_vector(text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        digest
            .iter()
            .take(8)
            .map(|&b| b as f32 / 255.0)
            .collect()
    }
}

#[async_trait]
impl EmbeddingGateway for MockEmbeddingGateway {
    async fn embed(&self, texts: &[String]) -> GatewayResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut seeded = self.vectors.lock().unwrap();
        let out = texts
            .iter()
            .map(|text| {
                if seeded.is_empty() {
                    Self::hash_vector(text)
                } else {
                    seeded.remove(0)
                }
            })
            .collect();
        Ok(out)
    }
}

/// Embedding gateway that always fails, for error-path tests.
pub struct FailingEmbeddingGateway;

#[async_trait]
impl EmbeddingGateway for FailingEmbeddingGateway {
    async fn embed(&self, _texts: &[String]) -> GatewayResult<Vec<Vec<f32>>> {
        Err(GatewayError::transient("embedding backend unavailable"))
    }
}

/// Subscriber that records every event it is handed.
#[derive(Default)]
pub struct CollectingSubscriber {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl CollectingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded events; clone it out before boxing the
    /// subscriber into a channel.
    pub fn events(&self) -> Arc<Mutex<Vec<ProgressEvent>>> {
        Arc::clone(&self.events)
    }
}

#[async_trait]
impl ProgressSubscriber for CollectingSubscriber {
    async fn on_event(&self, _session_id: &str, event: &ProgressEvent) -> Result<(), DeliveryError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Subscriber whose delivery always fails.
pub struct FailingSubscriber;

#[async_trait]
impl ProgressSubscriber for FailingSubscriber {
    async fn on_event(&self, _session_id: &str, _event: &ProgressEvent) -> Result<(), DeliveryError> {
        Err("connection closed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_gateway_consumes_in_order() {
        let gateway = MockAiGateway::new()
            .with_response(ScriptedResponse::Text("first".into()))
            .with_response(ScriptedResponse::RateLimited);

        assert_eq!(gateway.complete("a", 100).await.unwrap(), "first");
        assert!(matches!(
            gateway.complete("b", 100).await.unwrap_err(),
            GatewayError::RateLimited
        ));
        // Exhausted script falls back to an empty array.
        assert_eq!(gateway.complete("c", 100).await.unwrap(), "[]");
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(gateway.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_hash_embeddings_are_deterministic() {
        let gateway = MockEmbeddingGateway::new();
        let texts = vec!["same".to_string(), "same".to_string(), "other".to_string()];
        let vectors = gateway.embed(&texts).await.unwrap();

        assert_eq!(vectors[0], vectors[1]);
        assert_ne!(vectors[0], vectors[2]);
        assert_eq!(vectors[0].len(), 8);
    }

    #[tokio::test]
    async fn test_seeded_vectors_served_across_calls() {
        let gateway = MockEmbeddingGateway::with_vectors(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.5, 0.5],
        ]);

        let first = gateway
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let second = gateway.embed(&["c".to_string()]).await.unwrap();

        assert_eq!(first, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(second, vec![vec![0.5, 0.5]]);
        assert_eq!(gateway.call_count(), 2);
    }
}
