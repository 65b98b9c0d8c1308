//! Per-persona conversation history and the shared display transcript

use crate::llm::{Message, MessageRole};
use crate::persona::Side;
use serde::{Deserialize, Serialize};

/// One persona's context window.
///
/// The persona's own replies are `assistant` messages and the other persona's
/// replies are `user` messages. A trailing `user` message is the persona's
/// next input and is not part of its context yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The input this persona has not answered yet, if any
    pub fn pending_input(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    /// Everything before the pending input
    pub fn context(&self) -> &[Message] {
        match self.pending_input() {
            Some(_) => &self.messages[..self.messages.len() - 1],
            None => &self.messages,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Both personas' histories. They are never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPair {
    pub left: ConversationHistory,
    pub right: ConversationHistory,
}

impl HistoryPair {
    pub fn get(&self, side: Side) -> &ConversationHistory {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut ConversationHistory {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Record a reply: the speaker said it, the listener hears it
    pub fn record_reply(&mut self, speaker: Side, reply: &str) {
        self.get_mut(speaker).push_assistant(reply);
        self.get_mut(speaker.other()).push_user(reply);
    }

    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}

/// Who produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Left,
    Right,
    System,
}

impl From<Side> for Speaker {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => Speaker::Left,
            Side::Right => Speaker::Right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sequence: u64,
    pub speaker: Speaker,
    pub content: String,
}

/// Append-only display log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    fn push(&mut self, speaker: Speaker, content: String) -> &TranscriptEntry {
        let sequence = self.entries.last().map_or(1, |e| e.sequence + 1);
        self.entries.push(TranscriptEntry {
            sequence,
            speaker,
            content,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn push_reply(&mut self, side: Side, content: impl Into<String>) -> &TranscriptEntry {
        self.push(side.into(), content.into())
    }

    pub fn push_note(&mut self, content: impl Into<String>) -> &TranscriptEntry {
        self.push(Speaker::System, content.into())
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Persona replies only, in order
    pub fn replies(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries
            .iter()
            .filter(|e| e.speaker != Speaker::System)
    }

    pub fn reply_count(&self) -> usize {
        self.replies().count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
