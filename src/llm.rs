//! Model backend abstraction
//!
//! Defines the contract the conversation engine relies on and the Ollama
//! implementation of it.

mod error;
mod ollama;
mod reasoning;
mod types;

#[cfg(test)]
mod proptests;

pub use error::{LlmError, LlmErrorKind};
pub use ollama::{OllamaClient, DEFAULT_BASE_URL};
pub use reasoning::{strip_reasoning_markup, visible_text};
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Common interface for model-serving backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Raw identifiers of every model the server can run
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;

    /// Start a streaming reply
    async fn stream_reply(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError>;

    /// Blocking reply, equal to the concatenation of all streamed chunks
    async fn reply(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut stream = self.stream_reply(request).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        (**self).list_models().await
    }

    async fn stream_reply(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        (**self).stream_reply(request).await
    }

    async fn reply(&self, request: &ChatRequest) -> Result<String, LlmError> {
        (**self).reply(request).await
    }
}

/// Logging wrapper for backends
pub struct LoggingBackend<B> {
    inner: B,
}

impl<B: ChatBackend> LoggingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: ChatBackend> ChatBackend for LoggingBackend<B> {
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let result = self.inner.list_models().await;
        match &result {
            Ok(models) => tracing::debug!(count = models.len(), "Listed backend models"),
            Err(e) => tracing::warn!(error = %e.message, kind = ?e.kind, "Model listing failed"),
        }
        result
    }

    async fn stream_reply(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream_reply(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    model = %request.model,
                    messages = request.messages.len(),
                    first_byte_ms = %duration.as_millis(),
                    "Backend stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %request.model,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    status = ?e.status_code,
                    "Backend request failed"
                );
            }
        }

        result
    }

    async fn reply(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.reply(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(text) => {
                tracing::info!(
                    model = %request.model,
                    duration_ms = %duration.as_millis(),
                    chars = text.chars().count(),
                    "Backend reply completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %request.model,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    status = ?e.status_code,
                    "Backend request failed"
                );
            }
        }

        result
    }
}
