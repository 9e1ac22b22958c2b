//! Schema route handlers
//!
//! The GET endpoint returns the sanitized view - the same one the model
//! sees - so callers can inspect exactly what will be disclosed in prompts.

use crate::error::{ApiResult, AppError};
use crate::models::SuccessResponse;
use crate::schema::{SchemaDescriptor, SchemaSanitizer};
use crate::state::SharedState;
use axum::{extract::State, Json};
use tracing::info;

/// Get the sanitized schema for the connected database
pub async fn get_schema(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<SchemaDescriptor>>> {
    let schema = state.current_schema().await;
    let sanitized = SchemaSanitizer::sanitize(&schema, &state.policy);
    Ok(Json(SuccessResponse::new(sanitized)))
}

/// Re-introspect the live database and swap in the new snapshot
pub async fn refresh_schema(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<SchemaDescriptor>>> {
    let schema = state
        .database
        .introspect_schema()
        .await
        .map_err(|e| AppError::Internal(format!("Schema introspection failed: {}", e)))?;

    info!(
        "Schema refreshed: {} tables (checksum {})",
        schema.tables.len(),
        schema.checksum
    );

    state.replace_schema(schema).await;

    let schema = state.current_schema().await;
    let sanitized = SchemaSanitizer::sanitize(&schema, &state.policy);
    Ok(Json(SuccessResponse::new(sanitized)))
}
