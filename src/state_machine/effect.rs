//! Effects produced by state transitions

use crate::persona::{Persona, Side};
use crate::session_log::Outcome;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Put the prompt into the asked persona's history as its pending input
    SeedHistory { side: Side, prompt: String },

    /// Start a streaming backend call (spawns as background task)
    RequestReply {
        speaker: Side,
        input: String,
        turn: u32,
    },

    /// Append a persona reply to the transcript
    AppendReply { speaker: Side, reply: String },

    /// Append a reply to both histories
    RecordHistory { speaker: Side, reply: String },

    /// Append a system note to the transcript
    AppendNote { text: String },

    /// Drop both histories and the transcript
    ClearConversation,

    ReplacePersona { persona: Persona },

    ReplaceOptions { max_turns: u32, use_context: bool },

    /// Append the finished conversation to the session log
    WriteSessionLog { outcome: Outcome },

    /// Broadcast the new state to connected clients
    NotifyStateChange,
}

impl Effect {
    pub fn request_reply(speaker: Side, input: impl Into<String>, turn: u32) -> Self {
        Effect::RequestReply {
            speaker,
            input: input.into(),
            turn,
        }
    }

    pub fn note(text: impl Into<String>) -> Self {
        Effect::AppendNote { text: text.into() }
    }
}
