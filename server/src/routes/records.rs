//! Record endpoint routes.

use axum::{
    extract::{Path, Query, State},
    http::Uri,
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::handlers::{handle_pull, handle_push, PullQuery};
use crate::AppState;

/// Create record routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/{collection}", get(pull_handler).post(push_handler))
}

/// GET /api/{collection}?after= - Records changed since the watermark.
async fn pull_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<PullQuery>,
) -> Result<Json<Value>> {
    let body = handle_pull(&state.table, &state.config, &collection, &query)?;
    Ok(Json(body))
}

/// POST /api/{collection} - Upsert one record.
async fn push_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let stored = handle_push(&state.table, &collection, body, state.clock.now())?;
    Ok(Json(stored))
}

/// Anything unrouted.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
