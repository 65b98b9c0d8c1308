//! Trait abstractions for runtime I/O
//!
//! The backend side is `crate::llm::ChatBackend`; this module covers where
//! finished conversations go. Both have mock implementations in `testing`.

use crate::session_log::{SessionLog, SessionRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// Sink for finished conversations
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn record(&self, record: &SessionRecord) -> Result<(), String>;
}

#[async_trait]
impl ConversationLog for SessionLog {
    async fn record(&self, record: &SessionRecord) -> Result<(), String> {
        let log = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || log.append(&record))
            .await
            .map_err(|e| format!("Session log task failed: {e}"))?
            .map_err(|e| format!("Failed to write {}: {e}", self.path().display()))
    }
}

/// Logging disabled when `None`
#[async_trait]
impl<T: ConversationLog> ConversationLog for Option<T> {
    async fn record(&self, record: &SessionRecord) -> Result<(), String> {
        match self {
            Some(log) => log.record(record).await,
            None => Ok(()),
        }
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ConversationLog + ?Sized> ConversationLog for Arc<T> {
    async fn record(&self, record: &SessionRecord) -> Result<(), String> {
        (**self).record(record).await
    }
}
