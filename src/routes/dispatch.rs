use axum::{extract::State, routing::get, Json, Router};

use crate::dispatch::DispatchReport;
use crate::models::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/dispatch", get(dispatch).post(dispatch))
        .with_state(state)
}

/// Always 200; per-job failures are reported in the body.
pub async fn dispatch(State(state): State<AppState>) -> Json<DispatchReport> {
    Json(state.dispatcher.dispatch_all().await)
}
