//! The two debating personas

use serde::{Deserialize, Serialize};

/// Default system prompt for the left persona
pub const DEFAULT_SYSTEM_PROMPT_LEFT: &str =
    "You are an absolute coffee fanatic. You advocate for everyone to drink coffee.";

/// Default system prompt for the right persona
pub const DEFAULT_SYSTEM_PROMPT_RIGHT: &str =
    "You are an absolute tea fanatic. You advocate for everyone to drink tea.";

/// Which column of the chat a persona occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" | "a" => Some(Side::Left),
            "right" | "b" => Some(Side::Right),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog model bound to a persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelChoice {
    pub alias: String,
    pub backend_model_id: String,
}

/// One side of the debate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub side: Side,
    /// `None` when the user deselected the model
    pub model: Option<ModelChoice>,
    pub system_prompt: String,
    pub max_response_tokens: Option<u32>,
}

impl Persona {
    pub fn new(side: Side, model: Option<ModelChoice>) -> Self {
        let system_prompt = match side {
            Side::Left => DEFAULT_SYSTEM_PROMPT_LEFT,
            Side::Right => DEFAULT_SYSTEM_PROMPT_RIGHT,
        };
        Self {
            side,
            model,
            system_prompt: system_prompt.to_string(),
            max_response_tokens: None,
        }
    }

    /// Name shown in the UI: the model alias, or a placeholder when deselected
    pub fn display_name(&self) -> &str {
        match (&self.model, self.side) {
            (Some(model), _) => &model.alias,
            (None, Side::Left) => "model A",
            (None, Side::Right) => "model B",
        }
    }

    pub fn backend_model_id(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.backend_model_id.as_str())
    }
}

/// Requested settings for one persona
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaUpdate {
    pub side: Side,
    /// `None` deselects the model
    pub model: Option<ModelChoice>,
    /// `None` keeps the current prompt
    pub system_prompt: Option<String>,
    pub max_response_tokens: Option<u32>,
}

impl PersonaUpdate {
    /// The persona that results from applying this update to `current`
    pub fn apply_to(self, current: &Persona) -> Persona {
        Persona {
            side: self.side,
            model: self.model,
            system_prompt: self
                .system_prompt
                .unwrap_or_else(|| current.system_prompt.clone()),
            max_response_tokens: self.max_response_tokens,
        }
    }
}

impl From<Persona> for PersonaUpdate {
    fn from(persona: Persona) -> Self {
        Self {
            side: persona.side,
            model: persona.model,
            system_prompt: Some(persona.system_prompt),
            max_response_tokens: persona.max_response_tokens,
        }
    }
}

/// Both personas, addressable by side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaPair {
    pub left: Persona,
    pub right: Persona,
}

impl PersonaPair {
    pub fn new(left: Option<ModelChoice>, right: Option<ModelChoice>) -> Self {
        Self {
            left: Persona::new(Side::Left, left),
            right: Persona::new(Side::Right, right),
        }
    }

    pub fn get(&self, side: Side) -> &Persona {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn set(&mut self, persona: Persona) {
        match persona.side {
            Side::Left => self.left = persona,
            Side::Right => self.right = persona,
        }
    }
}
