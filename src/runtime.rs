//! Runtime for executing the conversation
//!
//! One task owns all conversation state and handles events strictly in order.
//! Clients talk to it through a [`ConversationHandle`].

mod executor;
pub mod traits;


pub use executor::ConversationRuntime;

use crate::history::{HistoryPair, TranscriptEntry};
use crate::persona::Side;
use crate::render::Bubble;
use crate::state_machine::{ConvContext, ConvState, Event, TransitionError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

/// An event plus an optional channel for the transition outcome
#[derive(Debug)]
pub struct Envelope {
    pub event: Event,
    pub ack: Option<oneshot::Sender<Result<ConvState, TransitionError>>>,
}

impl Envelope {
    /// Event raised by the runtime itself; nobody waits for the outcome
    pub fn internal(event: Event) -> Self {
        Self { event, ack: None }
    }
}

/// The reply currently streaming in
#[derive(Debug, Clone, Serialize)]
pub struct StreamingReply {
    pub side: Side,
    pub turn: u32,
    /// Visible text so far, reasoning removed
    pub text: String,
    pub bubble: Bubble,
}

/// Everything a client needs to draw the chat view
#[derive(Debug, Clone, Serialize)]
pub struct UiState {
    pub state: ConvState,
    pub context: ConvContext,
    pub transcript: Vec<TranscriptEntry>,
    pub histories: HistoryPair,
    pub streaming: Option<StreamingReply>,
}

impl UiState {
    pub fn new(context: ConvContext) -> Self {
        Self {
            state: ConvState::Idle,
            context,
            transcript: Vec::new(),
            histories: HistoryPair::default(),
            streaming: None,
        }
    }
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        snapshot: Box<UiState>,
    },
    StateChange {
        state: ConvState,
    },
    Chunk {
        side: Side,
        turn: u32,
        text: String,
        bubble: Bubble,
    },
    /// A transcript entry; system notes carry no bubble
    Reply {
        entry: TranscriptEntry,
        bubble: Option<Bubble>,
    },
    Reset,
    Error {
        message: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Conversation runtime is not running")]
    Closed,
}

/// Handle to interact with the running conversation
#[derive(Clone)]
pub struct ConversationHandle {
    pub event_tx: mpsc::Sender<Envelope>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    pub snapshot: Arc<RwLock<UiState>>,
}

impl ConversationHandle {
    /// Send an event and wait for the state it leads to
    pub async fn dispatch(&self, event: Event) -> Result<ConvState, DispatchError> {
        let (ack, outcome) = oneshot::channel();
        self.event_tx
            .send(Envelope {
                event,
                ack: Some(ack),
            })
            .await
            .map_err(|_| DispatchError::Closed)?;
        Ok(outcome.await.map_err(|_| DispatchError::Closed)??)
    }

    /// Subscribe to conversation updates
    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.broadcast_tx.subscribe()
    }

    pub async fn snapshot(&self) -> UiState {
        self.snapshot.read().await.clone()
    }
}
