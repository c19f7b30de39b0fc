//! Gateway implementations.
//!
//! This module provides a reference OpenAI-backed implementation of the
//! [`AiGateway`](crate::traits::AiGateway) and
//! [`EmbeddingGateway`](crate::traits::EmbeddingGateway) traits. Users can
//! use it directly or implement their own.

mod openai;

pub use openai::OpenAiGateway;
