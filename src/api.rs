//! HTTP API for the debate
//!
//! One conversation per process; every route talks to the same runtime.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::catalog::CatalogState;
use crate::runtime::ConversationHandle;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub conversation: ConversationHandle,
    pub catalog: Arc<CatalogState>,
}

impl AppState {
    pub fn new(conversation: ConversationHandle, catalog: CatalogState) -> Self {
        Self {
            conversation,
            catalog: Arc::new(catalog),
        }
    }
}
