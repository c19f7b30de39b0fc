//! Progress subscriber trait.

use async_trait::async_trait;

use crate::progress::ProgressEvent;

/// Error type for subscriber delivery failures.
///
/// Delivery is best-effort: the channel drops a subscriber on the first
/// failed delivery instead of propagating the error into the pipeline.
pub type DeliveryError = Box<dyn std::error::Error + Send + Sync>;

/// A sink for per-session progress events (e.g. a web-socket bridge).
#[async_trait]
pub trait ProgressSubscriber: Send + Sync {
    /// Deliver one event for one session.
    async fn on_event(
        &self,
        session_id: &str,
        event: &ProgressEvent,
    ) -> Result<(), DeliveryError>;
}
