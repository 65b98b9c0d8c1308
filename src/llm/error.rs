//! Backend error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// HTTP status returned by the model server, when it answered at all
    pub status_code: Option<u16>,
    /// Unparsed response body accompanying a non-success status
    pub raw_body: Option<String>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            raw_body: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Malformed, message)
    }

    /// Non-success response from the model server
    pub fn backend(status_code: u16, raw_body: impl Into<String>) -> Self {
        let raw_body = raw_body.into();
        Self {
            kind: LlmErrorKind::Backend,
            message: format!("Backend returned HTTP {status_code}: {}", raw_body.trim()),
            status_code: Some(status_code),
            raw_body: Some(raw_body),
        }
    }

    /// Error reported in-band by the model server (an `error` line mid-stream)
    pub fn reported(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: LlmErrorKind::Backend,
            message: format!("Backend error: {message}"),
            status_code: None,
            raw_body: Some(message),
        }
    }

    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::unavailable(format!("Connection failed: {e}"))
        } else if e.is_decode() {
            Self::malformed(format!("Failed to decode response: {e}"))
        } else {
            Self::new(LlmErrorKind::Backend, format!("Request failed: {e}"))
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    /// Model server unreachable
    Unavailable,
    /// Non-success status or an error reported by the server
    Backend,
    /// The call did not finish in time
    Timeout,
    /// Response could not be parsed or ended early
    Malformed,
}

impl LlmErrorKind {
    /// Whether waiting and polling again may help (readiness checks only)
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Unavailable)
    }
}
