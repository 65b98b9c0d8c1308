//! Ollama-compatible model server client

use super::types::{ChatRequest, ChunkStream, Message};
use super::{ChatBackend, LlmError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

/// Default local endpoint of `ollama serve`
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for a model server speaking the Ollama HTTP API
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self, LlmError> {
        // No overall request timeout: replies stream for as long as the model
        // talks. The runtime bounds each call instead.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| LlmError::unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn translate_request(request: &ChatRequest, stream: bool) -> OllamaChatRequest<'_> {
        OllamaChatRequest {
            model: &request.model,
            messages: &request.messages,
            stream,
            options: request.max_tokens.map(|num_predict| OllamaOptions { num_predict }),
        }
    }

    async fn post_chat(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&Self::translate_request(request, stream))
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::backend(status.as_u16(), body));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::unavailable(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(LlmError::backend(status.as_u16(), body));
        }

        let tags: OllamaTagsResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::malformed(format!("Failed to parse model list: {e} - body: {body}"))
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn stream_reply(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
        let response = self.post_chat(request, true).await?;
        Ok(ndjson_chunk_stream(response.bytes_stream()))
    }

    async fn reply(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self.post_chat(request, false).await?;
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        match serde_json::from_str::<OllamaChatLine>(&body) {
            Ok(OllamaChatLine { error: Some(error), .. }) => Err(LlmError::reported(error)),
            Ok(OllamaChatLine {
                message: Some(message),
                ..
            }) => Ok(message.content),
            Ok(_) => Err(LlmError::malformed(format!("Reply without message: {body}"))),
            Err(e) => Err(LlmError::malformed(format!(
                "Failed to parse reply: {e} - body: {body}"
            ))),
        }
    }
}

// ============================================================================
// Streaming (newline-delimited JSON)
// ============================================================================

/// Reassembles complete lines from arbitrarily split byte chunks
#[derive(Debug, Default)]
pub(super) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feed bytes, returning every line completed by them (without the newline)
    pub(super) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..pos]).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Whatever is left once the byte stream ends
    pub(super) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// One decoded line of a streaming chat response
#[derive(Debug, PartialEq)]
pub(super) enum StreamLine {
    Chunk(String),
    Done,
}

pub(super) fn decode_line(line: &str) -> Result<StreamLine, LlmError> {
    let parsed: OllamaChatLine = serde_json::from_str(line)
        .map_err(|e| LlmError::malformed(format!("Failed to parse stream chunk: {e} - line: {line}")))?;

    if let Some(error) = parsed.error {
        return Err(LlmError::reported(error));
    }
    if parsed.done {
        return Ok(StreamLine::Done);
    }
    Ok(StreamLine::Chunk(
        parsed.message.map(|m| m.content).unwrap_or_default(),
    ))
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    lines: LineBuffer,
    ready: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    /// Queue the outcome of one line; returns true once the stream is over
    fn accept(&mut self, line: &str) -> bool {
        match decode_line(line) {
            Ok(StreamLine::Chunk(text)) => {
                if !text.is_empty() {
                    self.ready.push_back(Ok(text));
                }
                false
            }
            Ok(StreamLine::Done) => true,
            Err(e) => {
                self.ready.push_back(Err(e));
                true
            }
        }
    }
}

/// Turn a streaming response body into text chunks.
///
/// The stream ends after the `done` line. A body that ends without one yields
/// a final error rather than passing off a truncated reply as complete.
pub(super) fn ndjson_chunk_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        lines: LineBuffer::default(),
        ready: VecDeque::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(data)) => {
                    for line in state.lines.push(data.as_ref()) {
                        if state.accept(&line) {
                            state.finished = true;
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state
                        .ready
                        .push_back(Err(LlmError::unavailable(format!("Stream interrupted: {e}"))));
                    state.finished = true;
                }
                None => {
                    let done = match state.lines.finish() {
                        Some(line) => state.accept(&line),
                        None => false,
                    };
                    if !done {
                        state.ready.push_back(Err(LlmError::malformed(
                            "Stream ended before the backend signalled completion",
                        )));
                    }
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatLine {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[allow(dead_code)] // Part of API response, always "assistant"
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}
