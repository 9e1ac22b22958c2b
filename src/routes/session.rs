//! Chat session route handlers
//!
//! One turn per POST: the question goes through the full pipeline and the
//! caller gets the outcome, whatever terminal state it reached.

use crate::error::{not_found_error, validation_error, ApiResult};
use crate::models::{ChatRequest, MessageResponse, SuccessResponse};
use crate::pipeline::PipelineOutcome;
use crate::session::SessionInfo;
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

/// Create a new chat session
pub async fn create_session(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<SessionInfo>>> {
    let session = state.sessions.create().await;

    Ok(Json(SuccessResponse::new(SessionInfo {
        id: session.id,
        created_at: session.created_at,
        turns: 0,
    })))
}

/// List all live sessions
pub async fn list_sessions(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<SessionInfo>>>> {
    Ok(Json(SuccessResponse::new(state.sessions.list().await)))
}

/// Delete a session and its history
pub async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.sessions.remove(id).await {
        return Err(not_found_error(format!("Session {} not found", id)));
    }

    Ok(Json(MessageResponse::new(format!("Session {} deleted", id))))
}

/// Process one user question in a session
pub async fn post_message(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<Json<SuccessResponse<PipelineOutcome>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| not_found_error(format!("Session {} not found", id)))?;

    debug!("Processing turn for session {}", id);

    // Holding the history lock for the whole turn keeps turns strictly
    // sequential within a session.
    let schema = state.current_schema().await;
    let mut history = session.history.lock().await;

    let outcome = state
        .pipeline
        .handle_turn(&payload.question, &schema, &mut history)
        .await;

    info!(
        "Session {} turn finished at stage {:?}",
        id, outcome.stage
    );

    Ok(Json(SuccessResponse::new(outcome)))
}
