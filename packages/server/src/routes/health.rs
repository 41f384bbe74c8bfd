//! Health check

use axum::{extract::State, response::Json};
use serde_json::json;

use crate::state::AppState;

/// Liveness probe
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "backend": state.dispenser.toolchain_name(),
    }))
}
