//! Trait seams between the pipelines and their collaborators.

pub mod ai;
pub mod embedding;
pub mod subscriber;

pub use ai::AiGateway;
pub use embedding::EmbeddingGateway;
pub use subscriber::{DeliveryError, ProgressSubscriber};
