//! Events that drive a conversation

use crate::llm::LlmErrorKind;
use crate::persona::{PersonaUpdate, Side};

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    /// Contents of the two input slots
    Ask {
        left_input: String,
        right_input: String,
    },
    Cancel,
    Reset,
    /// Merged into the current persona when handled
    ConfigurePersona {
        update: PersonaUpdate,
    },
    SetOptions {
        max_turns: u32,
        use_context: bool,
    },

    // Backend events
    /// Full reply, reasoning markup already stripped
    ReplyComplete {
        speaker: Side,
        reply: String,
    },
    ReplyFailed {
        speaker: Side,
        message: String,
        error_kind: LlmErrorKind,
    },
}

impl Event {
    pub fn ask(left_input: impl Into<String>, right_input: impl Into<String>) -> Self {
        Event::Ask {
            left_input: left_input.into(),
            right_input: right_input.into(),
        }
    }

    pub fn reply(speaker: Side, reply: impl Into<String>) -> Self {
        Event::ReplyComplete {
            speaker,
            reply: reply.into(),
        }
    }
}
