//! Pure state transition function

use super::{ConvContext, ConvState, Effect, Event};
use crate::persona::Side;
use crate::session_log::Outcome;
use thiserror::Error;

/// Largest accepted turn budget
pub const MAX_TURNS_LIMIT: u32 = 50;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A conversation is already running (cancel it first)")]
    Busy,
    #[error("The conversation has finished (reset it first)")]
    ResetRequired,
    #[error("Cannot change the conversation while it is running (cancel it first)")]
    ConversationActive,
    #[error("Nothing to cancel")]
    NothingToCancel,
    #[error("{0}")]
    Validation(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Starting a conversation
        // ============================================================
        (
            ConvState::Idle,
            Event::Ask {
                left_input,
                right_input,
            },
        ) => handle_ask(context, left_input.trim(), right_input.trim()),

        (s, Event::Ask { .. }) if s.is_running() => Err(TransitionError::Busy),
        (s, Event::Ask { .. }) if s.is_terminal() => Err(TransitionError::ResetRequired),

        // ============================================================
        // Replies
        // ============================================================
        (
            ConvState::AwaitingFirstReply {
                asked,
                stop_requested,
            },
            Event::ReplyComplete { speaker, reply },
        ) if *asked == speaker => Ok(after_reply(context, speaker, reply, 0, *stop_requested)),

        (
            ConvState::InProgress {
                turn,
                speaker: on_clock,
                stop_requested,
            },
            Event::ReplyComplete { speaker, reply },
        ) if *on_clock == speaker => Ok(after_reply(context, speaker, reply, *turn, *stop_requested)),

        (
            s,
            Event::ReplyFailed {
                speaker,
                message,
                error_kind,
            },
        ) if s.speaker() == Some(speaker) => {
            let name = context.personas.get(speaker).display_name();
            Ok(TransitionResult::new(ConvState::Failed {
                message: message.clone(),
                error_kind,
            })
            .with_effect(Effect::note(format!("{name} failed to reply: {message}")))
            .with_effect(Effect::WriteSessionLog {
                outcome: Outcome::Failed,
            })
            .with_effect(Effect::NotifyStateChange))
        }

        (s, Event::ReplyComplete { speaker, .. } | Event::ReplyFailed { speaker, .. }) => {
            Err(TransitionError::InvalidTransition(format!(
                "unexpected reply from {speaker} in state {}",
                s.status()
            )))
        }

        // ============================================================
        // Cancellation: observed at the next turn boundary
        // ============================================================
        (
            ConvState::AwaitingFirstReply {
                asked,
                stop_requested: _,
            },
            Event::Cancel,
        ) => Ok(TransitionResult::new(ConvState::AwaitingFirstReply {
            asked: *asked,
            stop_requested: true,
        })
        .with_effect(Effect::NotifyStateChange)),

        (ConvState::InProgress { turn, speaker, .. }, Event::Cancel) => {
            Ok(TransitionResult::new(ConvState::InProgress {
                turn: *turn,
                speaker: *speaker,
                stop_requested: true,
            })
            .with_effect(Effect::NotifyStateChange))
        }

        (_, Event::Cancel) => Err(TransitionError::NothingToCancel),

        // ============================================================
        // Reset and configuration
        // ============================================================
        (s, Event::Reset | Event::ConfigurePersona { .. } | Event::SetOptions { .. })
            if s.is_running() =>
        {
            Err(TransitionError::ConversationActive)
        }

        (_, Event::Reset) => Ok(TransitionResult::new(ConvState::Idle)
            .with_effect(Effect::ClearConversation)
            .with_effect(Effect::NotifyStateChange)),

        (_, Event::ConfigurePersona { update }) => {
            let current = context.personas.get(update.side);
            let persona = update.apply_to(current);
            Ok(TransitionResult::new(ConvState::Idle).with_effects([
                Effect::ReplacePersona { persona },
                Effect::ClearConversation,
                Effect::NotifyStateChange,
            ]))
        }

        (
            _,
            Event::SetOptions {
                max_turns,
                use_context,
            },
        ) => {
            if max_turns > MAX_TURNS_LIMIT {
                return Err(TransitionError::Validation(format!(
                    "max_turns must be at most {MAX_TURNS_LIMIT}"
                )));
            }
            Ok(TransitionResult::new(ConvState::Idle).with_effects([
                Effect::ReplaceOptions {
                    max_turns,
                    use_context,
                },
                Effect::ClearConversation,
                Effect::NotifyStateChange,
            ]))
        }

        (s, Event::Ask { .. }) => Err(TransitionError::InvalidTransition(format!(
            "ask in state {}",
            s.status()
        ))),
    }
}

fn handle_ask(
    context: &ConvContext,
    left_input: &str,
    right_input: &str,
) -> Result<TransitionResult, TransitionError> {
    let (asked, prompt) = match (left_input.is_empty(), right_input.is_empty()) {
        // Nothing to ask, or both slots filled: ignored, nothing changes
        (true, true) | (false, false) => return Ok(TransitionResult::new(ConvState::Idle)),
        (false, true) => (Side::Left, left_input),
        (true, false) => (Side::Right, right_input),
    };

    for side in [Side::Left, Side::Right] {
        let persona = context.personas.get(side);
        if persona.model.is_none() {
            return Err(TransitionError::Validation(format!(
                "No model selected for {}",
                persona.display_name()
            )));
        }
    }

    let mut result = TransitionResult::new(ConvState::AwaitingFirstReply {
        asked,
        stop_requested: false,
    });
    if context.use_context {
        result = result.with_effect(Effect::SeedHistory {
            side: asked,
            prompt: prompt.to_string(),
        });
    }
    Ok(result.with_effects([
        Effect::NotifyStateChange,
        Effect::request_reply(asked, prompt, 0),
    ]))
}

/// Record a finished reply and decide what happens next
fn after_reply(
    context: &ConvContext,
    speaker: Side,
    reply: String,
    turn: u32,
    stop_requested: bool,
) -> TransitionResult {
    let replies = turn + 1;
    let mut effects = vec![Effect::AppendReply {
        speaker,
        reply: reply.clone(),
    }];
    if context.use_context {
        effects.push(Effect::RecordHistory {
            speaker,
            reply: reply.clone(),
        });
    }

    if turn >= context.max_turns {
        effects.extend([
            Effect::note(format!("Conversation finished after {replies} replies.")),
            Effect::WriteSessionLog {
                outcome: Outcome::Completed,
            },
            Effect::NotifyStateChange,
        ]);
        return TransitionResult::new(ConvState::Completed { replies }).with_effects(effects);
    }

    if stop_requested {
        effects.extend([
            Effect::note("Conversation stopped by user."),
            Effect::WriteSessionLog {
                outcome: Outcome::Stopped,
            },
            Effect::NotifyStateChange,
        ]);
        return TransitionResult::new(ConvState::Stopped { replies }).with_effects(effects);
    }

    let next = speaker.other();
    effects.extend([
        Effect::NotifyStateChange,
        Effect::request_reply(next, reply, turn + 1),
    ]);
    TransitionResult::new(ConvState::InProgress {
        turn: turn + 1,
        speaker: next,
        stop_requested: false,
    })
    .with_effects(effects)
}
