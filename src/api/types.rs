//! API request and response types

use crate::catalog::AliasMap;
use crate::state_machine::ConvState;
use serde::{Deserialize, Serialize};

/// Both input slots; an omitted slot counts as empty
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub left: String,
    #[serde(default)]
    pub right: String,
}

/// Replace one persona's settings
#[derive(Debug, Deserialize)]
pub struct PersonaRequest {
    /// `null` deselects the model
    #[serde(default)]
    pub alias: Option<String>,
    /// Omitted keeps the current prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub max_response_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct OptionsRequest {
    pub max_turns: u32,
    pub use_context: bool,
}

/// Available models and how they are split between the two sides
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub aliases: AliasMap,
    pub left: AliasMap,
    pub right: AliasMap,
}

/// State reached after an action
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: ConvState,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
