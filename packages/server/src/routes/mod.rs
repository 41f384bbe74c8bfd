//! HTTP routes

mod downloads;
mod health;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Router with `/health` and `/downloads/*`
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/downloads", downloads::create_router())
        .with_state(state)
}
