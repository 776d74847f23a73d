use axum::{extract::State, routing::get, Json, Router};

use crate::db::health_check;
use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.pool {
        Some(pool) => Some(match health_check(pool).await {
            Ok(()) => "connected".to_string(),
            Err(_) => "unreachable".to_string(),
        }),
        None => None,
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        state_backend: state.orchestrator.state_backend().to_string(),
        database,
        configured_jobs: state.dispatcher.job_names().len(),
    })
}
