use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe with a little runtime state.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "commands_enabled": state.module.is_enabled(),
        "tracked_commands": state.module.lifecycle().tracker().len(),
        "in_flight": state.tasks.len(),
    }))
}
