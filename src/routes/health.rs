use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::routes::AppState;
use crate::services::{HealthReport, HealthService};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let service = HealthService::new(state.config.clone(), state.sessions.clone());
    Json(service.check().await)
}

// No extractors and no I/O: answers even while the database and cache are down.
async fn liveness() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
