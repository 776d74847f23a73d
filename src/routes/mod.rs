//! HTTP Routes
//!
//! - `POST /` and `POST /load` - run the load orchestrator for one job
//! - `GET|POST /dispatch` - fan out one queued load per configured job
//! - `GET /health` - liveness and backend summary

pub mod dispatch;
pub mod health;
pub mod load;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(load::router(state.clone()))
        .merge(dispatch::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
}
