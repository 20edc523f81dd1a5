use crate::app_state::AppState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let (current, max) = state.orchestrator.occupancy();
    Json(json!({
        "status": "ok",
        "appId": state.config.app_id,
        "downloads": { "current": current, "max": max },
    }))
}
