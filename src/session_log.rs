//! Append-only JSONL log of finished conversations
//!
//! One file per process session, named `{locale}-{session_id}.jsonl`. Each
//! finished conversation appends one line. The file is never read back.

use crate::history::{HistoryPair, TranscriptEntry};
use crate::persona::PersonaPair;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// How a conversation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Stopped,
    Failed,
}

/// One line of the session log
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    /// 1-based count of conversations finished in this session
    pub conversation: u32,
    pub finished_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub max_turns: u32,
    pub use_context: bool,
    pub personas: PersonaPair,
    pub histories: HistoryPair,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone)]
pub struct SessionLog {
    session_id: String,
    path: PathBuf,
}

impl SessionLog {
    /// Create a log in `dir` for a fresh session. The file appears on first append.
    pub fn new(dir: impl AsRef<Path>, locale: &str) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let path = dir.as_ref().join(format!("{locale}-{session_id}.jsonl"));
        Self { session_id, path }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &SessionRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)
    }
}

/// Locale from `LC_ALL` or `LANG`, e.g. `en_US.UTF-8` becomes `en_US`
pub fn locale_from_env() -> String {
    let value = std::env::var("LC_ALL")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var("LANG").ok());
    guess_locale(value.as_deref())
}

pub fn guess_locale(value: Option<&str>) -> String {
    let locale = value
        .and_then(|v| v.split(['.', '@']).next())
        .filter(|l| !l.is_empty() && *l != "C" && *l != "POSIX");
    locale.unwrap_or("unknown").to_string()
}
