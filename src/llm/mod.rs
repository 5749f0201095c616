//! LLM integration module providing abstraction over model backends
//!
//! This module implements:
//! - Common interface for LLM interactions via the LLMProvider trait
//! - Message streaming with line-delimited JSON responses
//! - The Ollama chat backend
//! - Shared types for requests, responses and errors


pub mod ollama;
pub mod streaming;
pub mod types;

pub use ollama::OllamaClient;
pub use types::*;

use anyhow::Result;
use async_trait::async_trait;

/// Callback invoked with each raw text delta as it arrives.
///
/// Returning an error aborts the stream; [`StreamingError::UserCancelled`]
/// is recognized by callers as a deliberate stop rather than a failure.
pub type StreamingCallback = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Trait for different LLM provider implementations
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Sends a request to the LLM service
    async fn send_message(
        &self,
        request: LLMRequest,
        streaming_callback: Option<&StreamingCallback>,
    ) -> Result<LLMResponse>;
}
