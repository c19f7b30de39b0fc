//! AI gateway trait.

use async_trait::async_trait;

use crate::error::GatewayResult;

/// Abstraction over an LLM completion provider.
///
/// Implementations wrap a specific vendor (OpenAI, Anthropic, ...) and own
/// their model selection; the orchestrator is model-agnostic and only hands
/// over a rendered prompt and an output ceiling.
///
/// Error contract: `Auth` is fatal for a run; `RateLimited` and `Transient`
/// degrade the affected batch to default records.
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// Run one completion and return the raw response text.
    ///
    /// The response is not contractually clean JSON; callers feed it
    /// through the tolerant parser.
    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> GatewayResult<String>;
}
