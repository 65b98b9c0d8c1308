//! Conversation state types

use crate::llm::LlmErrorKind;
use crate::persona::{PersonaPair, Side};
use serde::{Deserialize, Serialize};

/// Conversation state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// Waiting for a prompt in one of the input slots
    #[default]
    Idle,

    /// The asked persona is producing the opening reply (turn 0)
    AwaitingFirstReply {
        asked: Side,
        /// Cancel arrived; stop once the in-flight reply is recorded
        #[serde(default)]
        stop_requested: bool,
    },

    /// Personas are alternating; `speaker` is on the clock for `turn`
    InProgress {
        turn: u32,
        speaker: Side,
        #[serde(default)]
        stop_requested: bool,
    },

    /// The turn budget was used up
    Completed { replies: u32 },

    /// Stopped by the user between turns
    Stopped { replies: u32 },

    /// A backend call failed or timed out
    Failed {
        message: String,
        error_kind: LlmErrorKind,
    },
}

impl ConvState {
    /// A backend call is in flight
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ConvState::AwaitingFirstReply { .. } | ConvState::InProgress { .. }
        )
    }

    /// Finished; only a reset leads back to idle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConvState::Completed { .. } | ConvState::Stopped { .. } | ConvState::Failed { .. }
        )
    }

    pub fn status(&self) -> &'static str {
        match self {
            ConvState::Idle => "idle",
            ConvState::AwaitingFirstReply { .. } => "awaiting_first_reply",
            ConvState::InProgress { .. } => "in_progress",
            ConvState::Completed { .. } => "completed",
            ConvState::Stopped { .. } => "stopped",
            ConvState::Failed { .. } => "failed",
        }
    }

    /// Turn currently being produced, 0 for the opening reply
    pub fn current_turn(&self) -> Option<u32> {
        match self {
            ConvState::AwaitingFirstReply { .. } => Some(0),
            ConvState::InProgress { turn, .. } => Some(*turn),
            _ => None,
        }
    }

    /// Persona whose reply is in flight
    pub fn speaker(&self) -> Option<Side> {
        match self {
            ConvState::AwaitingFirstReply { asked, .. } => Some(*asked),
            ConvState::InProgress { speaker, .. } => Some(*speaker),
            _ => None,
        }
    }
}

/// Settings a conversation runs under. Only changed while nothing is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvContext {
    pub personas: PersonaPair,
    /// Exchanges after the opening reply
    pub max_turns: u32,
    /// Carry each persona's history into its prompts
    pub use_context: bool,
}

impl ConvContext {
    pub fn new(personas: PersonaPair, max_turns: u32, use_context: bool) -> Self {
        Self {
            personas,
            max_turns,
            use_context,
        }
    }
}
