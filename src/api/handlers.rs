//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    AskRequest, ErrorResponse, ModelsResponse, OptionsRequest, PersonaRequest, StateResponse,
};
use super::AppState;
use crate::persona::{PersonaUpdate, Side};
use crate::runtime::{DispatchError, SseEvent, UiState};
use crate::state_machine::{Event, TransitionError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Model catalog
        .route("/api/models", get(list_models))
        // Conversation view
        .route("/api/conversation", get(get_conversation))
        .route("/api/conversation/stream", get(stream_conversation))
        // User actions
        .route("/api/conversation/ask", post(ask))
        .route("/api/conversation/cancel", post(cancel))
        .route("/api/conversation/reset", post(reset))
        // Settings
        .route("/api/personas/:side", put(configure_persona))
        .route("/api/options", put(set_options))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Model Catalog
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let catalog = &state.catalog;
    Json(ModelsResponse {
        aliases: catalog.aliases.clone(),
        left: catalog.left_pool.clone(),
        right: catalog.right_pool.clone(),
    })
}

// ============================================================
// Conversation View
// ============================================================

async fn get_conversation(State(state): State<AppState>) -> Json<UiState> {
    Json(state.conversation.snapshot().await)
}

async fn stream_conversation(State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before taking the snapshot so nothing falls in between
    let broadcast_rx = state.conversation.subscribe();
    let init_event = SseEvent::Init {
        snapshot: Box::new(state.conversation.snapshot().await),
    };
    sse_stream(init_event, broadcast_rx)
}

// ============================================================
// User Actions
// ============================================================

async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<StateResponse>, AppError> {
    let new_state = state
        .conversation
        .dispatch(Event::ask(req.left, req.right))
        .await?;
    Ok(Json(StateResponse { state: new_state }))
}

async fn cancel(State(state): State<AppState>) -> Result<Json<StateResponse>, AppError> {
    let new_state = state.conversation.dispatch(Event::Cancel).await?;
    Ok(Json(StateResponse { state: new_state }))
}

async fn reset(State(state): State<AppState>) -> Result<Json<StateResponse>, AppError> {
    let new_state = state.conversation.dispatch(Event::Reset).await?;
    Ok(Json(StateResponse { state: new_state }))
}

// ============================================================
// Settings
// ============================================================

async fn configure_persona(
    State(state): State<AppState>,
    Path(side): Path<String>,
    Json(req): Json<PersonaRequest>,
) -> Result<Json<StateResponse>, AppError> {
    let side =
        Side::parse(&side).ok_or_else(|| AppError::NotFound(format!("Unknown side: {side}")))?;

    let model = match req.alias.as_deref() {
        None => None,
        Some(alias) if state.catalog.pool(side).contains_key(alias) => state.catalog.choice(alias),
        Some(alias) => {
            return Err(AppError::BadRequest(format!(
                "Model {alias} is not available for the {side} side"
            )))
        }
    };

    let update = PersonaUpdate {
        side,
        model,
        system_prompt: req.system_prompt,
        max_response_tokens: req.max_response_tokens,
    };

    let new_state = state
        .conversation
        .dispatch(Event::ConfigurePersona { update })
        .await?;
    Ok(Json(StateResponse { state: new_state }))
}

async fn set_options(
    State(state): State<AppState>,
    Json(req): Json<OptionsRequest>,
) -> Result<Json<StateResponse>, AppError> {
    let new_state = state
        .conversation
        .dispatch(Event::SetOptions {
            max_turns: req.max_turns,
            use_context: req.use_context,
        })
        .await?;
    Ok(Json(StateResponse { state: new_state }))
}

async fn get_version() -> &'static str {
    concat!("talking_heads ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Conflict(String),
    NotFound(String),
    Internal(String),
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Rejected(
                rejection @ (TransitionError::Busy
                | TransitionError::ConversationActive
                | TransitionError::ResetRequired
                | TransitionError::NothingToCancel
                | TransitionError::InvalidTransition(_)),
            ) => AppError::Conflict(rejection.to_string()),
            DispatchError::Rejected(rejection) => AppError::BadRequest(rejection.to_string()),
            DispatchError::Closed => AppError::Internal(DispatchError::Closed.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
