//! Embedding gateway trait.

use async_trait::async_trait;

use crate::error::GatewayResult;

/// Abstraction over a text embedding provider.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embed a batch of texts.
    ///
    /// Returns one vector per input text, in input order. All vectors in
    /// one response have the same dimension.
    async fn embed(&self, texts: &[String]) -> GatewayResult<Vec<Vec<f32>>>;
}
