//! Conversation runtime executor

use super::traits::ConversationLog;
use super::{ConversationHandle, Envelope, SseEvent, StreamingReply, UiState};

use crate::history::{HistoryPair, Transcript};
use crate::llm::{strip_reasoning_markup, visible_text, ChatBackend, ChatRequest, LlmError, LlmErrorKind};
use crate::persona::Side;
use crate::prompt::compose;
use crate::render::Bubble;
use crate::session_log::{Outcome, SessionRecord};
use crate::state_machine::{transition, ConvContext, ConvState, Effect, Event, TransitionError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Mutable conversation data the state machine does not hold
#[derive(Debug, Clone, Default)]
struct EngineState {
    pub histories: HistoryPair,
    pub transcript: Transcript,
    /// Conversations that reached a terminal state this session
    pub finished: u32,
}

impl EngineState {
    fn clear(&mut self) {
        self.histories.clear();
        self.transcript.clear();
    }
}

/// Conversation runtime, generic over the backend and the session log
pub struct ConversationRuntime<B, L>
where
    B: ChatBackend + 'static,
    L: ConversationLog + 'static,
{
    context: ConvContext,
    state: ConvState,
    engine: EngineState,
    backend: Arc<B>,
    log: L,
    request_timeout: Duration,
    event_rx: mpsc::Receiver<Envelope>,
    event_tx: mpsc::Sender<Envelope>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot: Arc<RwLock<UiState>>,
    /// Stops the run loop and any in-flight backend call
    shutdown: CancellationToken,
}

impl<B, L> ConversationRuntime<B, L>
where
    B: ChatBackend + 'static,
    L: ConversationLog + 'static,
{
    pub fn new(context: ConvContext, backend: B, log: L, request_timeout: Duration) -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(256);
        let snapshot = Arc::new(RwLock::new(UiState::new(context.clone())));
        Self {
            context,
            state: ConvState::Idle,
            engine: EngineState::default(),
            backend: Arc::new(backend),
            log,
            request_timeout,
            event_rx,
            event_tx,
            broadcast_tx,
            snapshot,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie the runtime to an external shutdown signal
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn handle(&self) -> ConversationHandle {
        ConversationHandle {
            event_tx: self.event_tx.clone(),
            broadcast_tx: self.broadcast_tx.clone(),
            snapshot: self.snapshot.clone(),
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            max_turns = self.context.max_turns,
            use_context = self.context.use_context,
            "Starting conversation runtime"
        );

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                more = self.advance() => {
                    if !more {
                        break;
                    }
                }
            }
        }

        tracing::info!("Conversation runtime stopped");
    }

    /// Wait for the next event and handle it. Returns false once every sender is gone.
    pub async fn advance(&mut self) -> bool {
        let Some(Envelope { event, ack }) = self.event_rx.recv().await else {
            return false;
        };

        let outcome = self.process_event(event).await;
        if let Err(e) = &outcome {
            tracing::warn!(
                error = %e,
                state = self.state.status(),
                turn = ?self.state.current_turn(),
                "Event rejected"
            );
            let _ = self.broadcast_tx.send(SseEvent::Error {
                message: e.to_string(),
            });
        }
        if let Some(ack) = ack {
            let _ = ack.send(outcome.map(|()| self.state.clone()));
        }
        true
    }

    async fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        // Effects may generate follow-up events; handle them in the same step
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let result = transition(&self.state, &self.context, current_event)?;
            let old_state = std::mem::replace(&mut self.state, result.new_state);
            if old_state != self.state {
                tracing::debug!(from = old_state.status(), to = self.state.status(), "State transition");
            }

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        self.refresh_snapshot().await;
        Ok(())
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::SeedHistory { side, prompt } => {
                self.engine.histories.get_mut(side).push_user(prompt);
                None
            }

            Effect::RequestReply {
                speaker,
                input,
                turn,
            } => self.request_reply(speaker, &input, turn),

            Effect::AppendReply { speaker, reply } => {
                let bubble = Bubble::measure(&reply, speaker);
                let entry = self.engine.transcript.push_reply(speaker, reply).clone();
                tracing::info!(side = %speaker, sequence = entry.sequence, "Reply recorded");
                self.snapshot.write().await.streaming = None;
                let _ = self.broadcast_tx.send(SseEvent::Reply {
                    entry,
                    bubble: Some(bubble),
                });
                None
            }

            Effect::RecordHistory { speaker, reply } => {
                self.engine.histories.record_reply(speaker, &reply);
                None
            }

            Effect::AppendNote { text } => {
                let entry = self.engine.transcript.push_note(text).clone();
                let _ = self
                    .broadcast_tx
                    .send(SseEvent::Reply { entry, bubble: None });
                None
            }

            Effect::ClearConversation => {
                self.engine.clear();
                self.snapshot.write().await.streaming = None;
                let _ = self.broadcast_tx.send(SseEvent::Reset);
                None
            }

            Effect::ReplacePersona { persona } => {
                tracing::info!(
                    side = %persona.side,
                    model = ?persona.backend_model_id(),
                    "Persona updated"
                );
                self.context.personas.set(persona);
                None
            }

            Effect::ReplaceOptions {
                max_turns,
                use_context,
            } => {
                tracing::info!(max_turns, use_context, "Options updated");
                self.context.max_turns = max_turns;
                self.context.use_context = use_context;
                None
            }

            Effect::WriteSessionLog { outcome } => {
                self.write_session_log(outcome).await;
                None
            }

            Effect::NotifyStateChange => {
                self.refresh_snapshot().await;
                let _ = self.broadcast_tx.send(SseEvent::StateChange {
                    state: self.state.clone(),
                });
                None
            }
        }
    }

    /// Compose the prompt and stream the reply in a background task.
    /// The task reports back with `ReplyComplete` or `ReplyFailed`.
    fn request_reply(&self, speaker: Side, input: &str, turn: u32) -> Option<Event> {
        let persona = self.context.personas.get(speaker);
        let Some(model) = persona.backend_model_id() else {
            return Some(Event::ReplyFailed {
                speaker,
                message: format!("No model selected for {}", persona.display_name()),
                error_kind: LlmErrorKind::Backend,
            });
        };

        let history = self.engine.histories.get(speaker).context();
        let request = ChatRequest {
            model: model.to_string(),
            messages: compose(persona, input, history, self.context.use_context),
            max_tokens: persona.max_response_tokens,
        };

        tracing::info!(
            side = %speaker,
            turn,
            model = %request.model,
            messages = request.messages.len(),
            "Requesting reply (background)"
        );

        let task = ReplyTask {
            backend: self.backend.clone(),
            request,
            speaker,
            turn,
            timeout: self.request_timeout,
            broadcast_tx: self.broadcast_tx.clone(),
            snapshot: self.snapshot.clone(),
            event_tx: self.event_tx.clone(),
            shutdown: self.shutdown.clone(),
        };
        tokio::spawn(task.run());

        // The event will come from the spawned task
        None
    }

    async fn write_session_log(&mut self, outcome: Outcome) {
        self.engine.finished += 1;
        let record = SessionRecord {
            conversation: self.engine.finished,
            finished_at: chrono::Utc::now(),
            outcome,
            max_turns: self.context.max_turns,
            use_context: self.context.use_context,
            personas: self.context.personas.clone(),
            histories: self.engine.histories.clone(),
            transcript: self.engine.transcript.entries().to_vec(),
        };
        match self.log.record(&record).await {
            Ok(()) => tracing::info!(
                ?outcome,
                conversation = record.conversation,
                replies = self.engine.transcript.reply_count(),
                "Conversation logged"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to write session log"),
        }
    }

    async fn refresh_snapshot(&self) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.state = self.state.clone();
        snapshot.context = self.context.clone();
        snapshot.transcript = self.engine.transcript.entries().to_vec();
        snapshot.histories = self.engine.histories.clone();
        if !self.state.is_running() {
            snapshot.streaming = None;
        }
    }
}

/// One streaming backend call
struct ReplyTask<B: ChatBackend> {
    backend: Arc<B>,
    request: ChatRequest,
    speaker: Side,
    turn: u32,
    timeout: Duration,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot: Arc<RwLock<UiState>>,
    event_tx: mpsc::Sender<Envelope>,
    shutdown: CancellationToken,
}

impl<B: ChatBackend> ReplyTask<B> {
    async fn run(self) {
        let started = std::time::Instant::now();
        let outcome = tokio::select! {
            biased;

            () = self.shutdown.cancelled() => {
                tracing::info!(side = %self.speaker, turn = self.turn, "Reply abandoned on shutdown");
                return;
            }

            outcome = tokio::time::timeout(self.timeout, self.stream()) => outcome,
        };

        let event = match outcome {
            Ok(Ok(text)) => {
                let reply = strip_reasoning_markup(&text).trim().to_string();
                tracing::info!(
                    side = %self.speaker,
                    turn = self.turn,
                    duration_ms = %started.elapsed().as_millis(),
                    chars = reply.chars().count(),
                    "Reply complete"
                );
                Event::reply(self.speaker, reply)
            }
            Ok(Err(e)) => Event::ReplyFailed {
                speaker: self.speaker,
                message: e.message,
                error_kind: e.kind,
            },
            Err(_) => {
                tracing::warn!(
                    side = %self.speaker,
                    turn = self.turn,
                    timeout_secs = self.timeout.as_secs(),
                    "Reply timed out"
                );
                Event::ReplyFailed {
                    speaker: self.speaker,
                    message: format!("No reply within {} seconds", self.timeout.as_secs()),
                    error_kind: LlmErrorKind::Timeout,
                }
            }
        };

        if let Event::ReplyFailed { message, .. } = &event {
            let _ = self.broadcast_tx.send(SseEvent::Error {
                message: message.clone(),
            });
        }
        let _ = self.event_tx.send(Envelope::internal(event)).await;
    }

    /// Consume the stream, publishing every chunk; returns the raw full text
    async fn stream(&self) -> Result<String, LlmError> {
        let mut chunks = self.backend.stream_reply(&self.request).await?;
        let mut text = String::new();

        while let Some(chunk) = chunks.next().await {
            text.push_str(&chunk?);
            let visible = visible_text(&text);
            let bubble = Bubble::measure(&visible, self.speaker);

            self.snapshot.write().await.streaming = Some(StreamingReply {
                side: self.speaker,
                turn: self.turn,
                text: visible.clone(),
                bubble,
            });
            let _ = self.broadcast_tx.send(SseEvent::Chunk {
                side: self.speaker,
                turn: self.turn,
                text: visible,
                bubble,
            });
        }

        Ok(text)
    }
}
